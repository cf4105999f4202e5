//! Runs two ticks of the engine against a temporary CSV file and prints
//! every notification, with a submitter that only logs what it receives.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use csvsync::{
    FieldRule, Record, RemoteSubmitter, StatusChannel, StatusEvent, SubmitError, SyncEngine,
    SyncTarget, TargetRegistry,
};

struct PrintingSubmitter;

#[async_trait]
impl RemoteSubmitter for PrintingSubmitter {
    async fn submit(&self, dataset: &[Record], resource_path: &str) -> Result<(), SubmitError> {
        println!("-> POST {} ({} rows)", resource_path, dataset.len());
        for row in dataset {
            println!("   {:?}", row);
        }
        Ok(())
    }
}

fn print_events(channel: &mut StatusChannel) {
    for event in channel.drain() {
        match event {
            StatusEvent::Log { message } => println!("[log] {}", message),
            StatusEvent::Status { message, severity, target } => {
                println!("[{:?}] {}: {}", severity, target, message)
            }
            StatusEvent::Health(health) => println!("[health] {:?}", health),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    println!("Basic Sync Example");
    println!("==================");

    let temp_dir = tempfile::TempDir::new()?;
    let csv_path = temp_dir.path().join("socios.csv");
    tokio::fs::write(&csv_path, "id,nombre\n1,Ana\n2,Luis\n").await?;

    let target = SyncTarget::new("Socios", "/socios/update")
        .with_file_path(&csv_path)
        .with_schema(vec![FieldRule::required("id"), FieldRule::optional("nombre")]);
    let registry = TargetRegistry::new(vec![target, SyncTarget::prestamos()]);

    let (reporter, mut channel) = StatusChannel::new();
    let mut engine = SyncEngine::new(registry.clone(), Arc::new(PrintingSubmitter), reporter);

    engine.announce().await;
    print_events(&mut channel);

    println!();
    println!("First tick");
    println!("----------");
    let summary = engine.tick().await;
    print_events(&mut channel);
    println!("Synced: {:?}", summary.synced);

    println!();
    println!("Second tick, nothing changed");
    println!("----------------------------");
    let summary = engine.tick().await;
    print_events(&mut channel);
    println!("Synced: {:?}", summary.synced);

    if let Some(socios) = registry.get("Socios").await {
        println!();
        println!("Checksum: {}", socios.checksum);
        println!("Last sync: {}", socios.last_sync);
    }

    Ok(())
}
