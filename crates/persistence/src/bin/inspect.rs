#![deny(warnings)]

use persistence::{default_save_path, FileStore, ProgressStore};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut path = default_save_path().to_string();
    let mut namespace = "tap".to_string();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--namespace" => {
                namespace = it
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--namespace needs a value"))?
            }
            other => path = other.to_string(),
        }
    }

    let store = ProgressStore::new(FileStore::open(&path)?, namespace);
    let record = store.load()?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
