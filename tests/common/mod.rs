//! Shared harness: spin up an in-process peer group over the lossy mesh
//! and wait for agreement.

use std::time::Duration;

use bytes::Bytes;
use paxlog::transport::memory::Mesh;
use paxlog::{Engine, EngineConfig, Fate, LogHandle, Seq, SystemClock};

/// Initialize tracing for tests. Call at the start of each test.
/// Uses `RUST_LOG` for filtering (defaults to "debug" for this crate).
pub fn init_tracing() -> impl Sized {
    use tracing::Dispatch;
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("paxlog=debug")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_test_writer()
        .finish();

    let dispatch = Dispatch::new(subscriber);
    tracing::dispatcher::set_default(&dispatch)
}

pub struct Cluster {
    pub mesh: Mesh,
    pub handles: Vec<LogHandle>,
}

/// Spin up `n` peers over one mesh seeded with `seed`.
pub fn cluster(n: usize, seed: u64) -> Cluster {
    let mesh = Mesh::with_seed(seed);
    let peers: Vec<usize> = (0..n).collect();
    let mut handles = Vec::new();
    for me in 0..n {
        let (engine, handle, wire) = Engine::new(
            EngineConfig::default(),
            me,
            peers.clone(),
            mesh.transport(me),
            SystemClock,
        );
        mesh.register(me, wire);
        tokio::spawn(engine.run());
        handles.push(handle);
    }
    Cluster { mesh, handles }
}

/// Wait until every handle reports `seq` as Decided, assert they all agree,
/// and return the chosen value.
pub async fn wait_agreement(handles: &[LogHandle], seq: Seq, within: Duration) -> Bytes {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        let mut chosen: Option<Bytes> = None;
        let mut all_decided = true;
        for handle in handles {
            match handle.status(seq).await.unwrap() {
                (Fate::Decided, Some(value)) => {
                    if let Some(first) = &chosen {
                        assert_eq!(first, &value, "peers disagree on seq {seq}");
                    } else {
                        chosen = Some(value);
                    }
                }
                _ => {
                    all_decided = false;
                    break;
                }
            }
        }
        if all_decided {
            if let Some(value) = chosen {
                return value;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "seq {seq} not decided everywhere within {within:?}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
