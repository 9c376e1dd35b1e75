use crate::pipeline::Delivery;
use bytes::Bytes;
use clap::ValueEnum;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// How record payloads are written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Hex,
}

/// One output line per payload.
pub fn render(payload: &Bytes, format: Format) -> Vec<u8> {
    let mut line = match format {
        Format::Text => payload.to_vec(),
        Format::Hex => payload
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
            .into_bytes(),
    };
    line.push(b'\n');
    line
}

/// Write every delivery until all senders are gone, flushing after each batch.
pub async fn write_deliveries<W>(
    mut rx: mpsc::Receiver<Delivery>,
    out: &mut W,
    format: Format,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(delivery) = rx.recv().await {
        for payload in &delivery.records.data {
            out.write_all(&render(payload, format)).await?;
        }
        out.flush().await?;
    }
    Ok(())
}
