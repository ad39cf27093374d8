use serde::Serialize;
use tracing::info;
use ulid::Ulid;

use clubsched::config::Config;
use clubsched::engine::Engine;
use clubsched::model::{BookingInfo, ClassInfo, RoomInfo, SlotInfo, TrainerInfo};

const USAGE: &str = "usage: clubsched <check|dump|compact>";

#[derive(Serialize)]
struct TrainerSnapshot {
    #[serde(flatten)]
    trainer: TrainerInfo,
    availability: Vec<SlotInfo>,
}

#[derive(Serialize)]
struct RoomSnapshot {
    #[serde(flatten)]
    room: RoomInfo,
    bookings: Vec<BookingInfo>,
}

#[derive(Serialize)]
struct ClassSnapshot {
    #[serde(flatten)]
    class: ClassInfo,
    members: Vec<Ulid>,
}

#[derive(Serialize)]
struct Snapshot {
    trainers: Vec<TrainerSnapshot>,
    rooms: Vec<RoomSnapshot>,
    classes: Vec<ClassSnapshot>,
}

async fn snapshot(engine: &Engine) -> Result<Snapshot, Box<dyn std::error::Error>> {
    let mut trainers = Vec::new();
    for trainer in engine.list_trainers().await {
        let availability = engine.trainer_availability(trainer.id).await?;
        trainers.push(TrainerSnapshot { trainer, availability });
    }
    let mut rooms = Vec::new();
    for room in engine.list_rooms().await {
        let bookings = engine.room_bookings(room.id).await?;
        rooms.push(RoomSnapshot { room, bookings });
    }
    let mut classes = Vec::new();
    for class in engine.available_classes().await {
        let members = engine.class_members(class.id).await?;
        classes.push(ClassSnapshot { class, members });
    }
    Ok(Snapshot { trainers, rooms, classes })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let Some(command) = std::env::args().nth(1) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config = Config::from_env()?;
    info!("data_dir: {}", config.data_dir.display());
    let engine = Engine::open(&config)?;

    match command.as_str() {
        "check" => {
            let violations = engine.audit().await;
            if violations.is_empty() {
                println!("ok");
                return Ok(());
            }
            for v in &violations {
                println!("{}: {} ({})", v.resource_id, v.reason, v.entity_id);
            }
            eprintln!("{} violations", violations.len());
            std::process::exit(1);
        }
        "dump" => {
            let snapshot = snapshot(&engine).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        "compact" => {
            engine.compact_wal().await?;
            println!("compacted {}", config.wal_path().display());
        }
        other => {
            eprintln!("unknown command: {other}\n{USAGE}");
            std::process::exit(2);
        }
    }
    Ok(())
}
