use std::time::Duration;

use tempo::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> TempoResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let clock = Clock::system(ClockConfig::default());
    let read_ts = clock.now();
    let interval = UncertaintyInterval::new(read_ts.into(), clock.max_offset())
        .with_local_limit(clock.now());
    tracing::info!(%read_ts, ?interval, "started read");

    let synthetic = Timestamp::from(clock.now()).add(1_000_000, 0).with_synthetic();
    tracing::info!(
        %synthetic,
        uncertain = interval.is_uncertain(read_ts.into(), synthetic),
        wire_len = synthetic.to_wire_bytes().len(),
        "observed future write"
    );

    let registry = ContentionRegistry::default();
    let (waiter, blocker) = (TxnId::random(), TxnId::random());
    for (index_key, millis) in [
        (&b"alice"[..], 12),
        (&b"bob"[..], 3),
        (&b"alice"[..], 7),
    ] {
        let key = TableKey::new(42, 1, index_key).to_bytes();
        registry.record(ContentionEvent::new(
            key,
            waiter,
            blocker,
            Duration::from_millis(millis),
        ))?;
    }

    let snapshot = registry.snapshot();
    let encoded = snapshot.encode()?;
    let merged = merge_serialized(
        snapshot,
        SerializedRegistry::decode(&encoded)?,
        registry.config(),
    );
    tracing::info!(bytes = encoded.len(), "merged contention of two nodes:\n{merged}");
    Ok(())
}
