//! Stream walkthrough: append, read, trim, consumer groups and a snapshot
//! reload.
//!
//! Run with:
//! ```bash
//! RUST_LOG=debug cargo run -p streamlog-storage --example stream_demo
//! ```

use streamlog_storage::{
    decode_stream, encode_stream, Compression, Stream, StreamConfig, StreamId,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut stream = Stream::with_config(StreamConfig {
        node_max_entries: 8,
        snapshot_compression: Compression::Lz4,
        ..Default::default()
    });

    for i in 0..32 {
        let reading = format!("{:.1}", 20.0 + i as f64 / 4.0);
        stream.append(&[("sensor", "greenhouse-1"), ("celsius", reading.as_str())], None)?;
    }
    println!("appended {} records into {} nodes", stream.len(), stream.node_count());

    for record in stream.range(StreamId::MIN, StreamId::MAX, true, Some(3))? {
        let celsius = record
            .get(b"celsius")
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .unwrap_or_default();
        println!("latest {} -> {celsius}", record.id);
    }

    let removed = stream.trim(20, true)?;
    println!("approximate trim removed {removed}, {} left", stream.len());

    stream.create_group("alerts", StreamId::MIN)?;
    let oldest = stream.range(StreamId::MIN, StreamId::MAX, false, Some(4))?;
    for record in &oldest {
        stream.record_delivery("alerts", "pager", record.id)?;
    }
    stream.acknowledge("alerts", &[oldest[0].id])?;
    let summary = stream.pending_summary("alerts")?;
    println!("alerts pending: {} ({:?}..{:?})", summary.count, summary.min, summary.max);

    let bytes = encode_stream(&stream)?;
    let reloaded = decode_stream(&bytes, stream.config().clone())?;
    println!(
        "snapshot of {} bytes reloads {} records, last id {}",
        bytes.len(),
        reloaded.len(),
        reloaded.last_id()
    );

    Ok(())
}
