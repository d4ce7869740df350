//! CLI tool for hwtally

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "hwtally-cli")]
#[command(about = "hwtally: CPU tick, disk counter and processor identity accounting", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "text", global = true)]
    format: String,

    /// Configuration file (defaults to the per-user config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Show cumulative CPU ticks (default)
    Ticks {
        /// Also show one row per logical processor
        #[arg(long)]
        per_cpu: bool,
    },
    /// List disks, partitions and their counters
    Disks,
    /// Show processor identity
    Processor,
    /// Sample CPU and disk counters repeatedly and print the deltas
    Poll {
        /// Number of samples
        #[arg(short = 'n', long, default_value_t = 5)]
        count: u32,
    },
}

#[cfg(feature = "cli")]
fn print_ticks(label: &str, ticks: &hwtally::TickVector) {
    print!("{:<8}", label);
    for tick in hwtally::TickType::ALL {
        print!(" {:?}={}", tick, ticks.get(tick));
    }
    println!();
}

#[cfg(feature = "cli")]
fn busy_percent(prev: &hwtally::TickVector, cur: &hwtally::TickVector) -> f64 {
    let total = cur.total().saturating_sub(prev.total());
    if total == 0 {
        return 0.0;
    }
    cur.busy().saturating_sub(prev.busy()) as f64 * 100.0 / total as f64
}

#[cfg(feature = "cli")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use hwtally::{detect, track_disks, Config, HardwareProbe};

    let cli = Cli::parse();

    env_logger::init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let json = match cli.format.as_str() {
        "json" => true,
        "text" => false,
        other => return Err(format!("unknown format: {} (expected json or text)", other).into()),
    };

    let mut probe = detect(&config)?;
    log::debug!("using {} probe", probe.platform());

    match cli.command.unwrap_or(Commands::Ticks { per_cpu: false }) {
        Commands::Ticks { per_cpu } => {
            let system = probe.system_ticks();
            let processors = if per_cpu { probe.processor_ticks() } else { Vec::new() };

            if json {
                let value = serde_json::json!({
                    "system": system,
                    "processors": processors,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_ticks("cpu", &system);
                for (idx, ticks) in processors.iter().enumerate() {
                    print_ticks(&format!("cpu{}", idx), ticks);
                }
            }
        }

        Commands::Disks => {
            let disks = probe.disks();
            if json {
                println!("{}", serde_json::to_string_pretty(&disks)?);
            } else {
                for disk in &disks {
                    println!(
                        "{} - {} ({} bytes, serial {})",
                        disk.name,
                        disk.model,
                        disk.size_bytes,
                        if disk.serial.is_empty() { "n/a" } else { disk.serial.as_str() }
                    );
                    let c = &disk.counters;
                    println!(
                        "  reads {} ({} bytes), writes {} ({} bytes), queue {}, busy {} ms",
                        c.reads, c.read_bytes, c.writes, c.write_bytes, c.queue_length, c.busy_time_ms
                    );
                    for part in &disk.partitions {
                        println!(
                            "  {} [{}:{}] {} bytes {} {} {}",
                            part.dev_node,
                            part.major_id,
                            part.minor_id,
                            part.size_bytes,
                            part.filesystem_type,
                            part.mount_point,
                            part.uuid
                        );
                    }
                }
            }
        }

        Commands::Processor => {
            let identity = probe.processor_identity();
            if json {
                println!("{}", serde_json::to_string_pretty(&identity)?);
            } else {
                println!("Vendor:       {}", identity.vendor);
                println!("Name:         {}", identity.name);
                println!(
                    "Family:       {} Model: {} Stepping: {}",
                    identity.family, identity.model, identity.stepping
                );
                println!(
                    "Processor ID: {} ({:?})",
                    identity.processor_id_hex, identity.processor_id_source
                );
                let flags: Vec<&str> = identity.feature_flags.iter().map(String::as_str).collect();
                println!("Flags:        {}", flags.join(" "));
            }
        }

        Commands::Poll { count } => {
            let interval = config.general.poll_interval();
            let mut store = track_disks(&probe.disks());
            let mut prev_ticks = probe.system_ticks();

            for sample in 1..=count {
                std::thread::sleep(interval);

                let before = store.clone();
                let outcome = probe.refresh_disk_counters(&mut store);
                let ticks = probe.system_ticks();
                let busy = busy_percent(&prev_ticks, &ticks);
                prev_ticks = ticks;

                if json {
                    let value = serde_json::json!({
                        "sample": sample,
                        "cpu_busy_percent": busy,
                        "disks": store.iter().collect::<std::collections::BTreeMap<_, _>>(),
                        "outcome": outcome,
                    });
                    println!("{}", serde_json::to_string(&value)?);
                } else {
                    println!("sample {}: cpu busy {:.1}%", sample, busy);
                    for (name, cur) in store.iter() {
                        let Some(prev) = before.get(name) else {
                            continue;
                        };
                        println!(
                            "  {:<16} +{} reads +{} writes +{} ms busy{}",
                            name,
                            cur.reads.saturating_sub(prev.reads),
                            cur.writes.saturating_sub(prev.writes),
                            cur.busy_time_ms.saturating_sub(prev.busy_time_ms),
                            if outcome.refreshed(name) == Some(false) { " (stale)" } else { "" }
                        );
                    }
                }
            }
        }
    }

    probe.close();
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features not enabled. Please compile with --features cli");
    std::process::exit(1);
}
