use std::sync::Arc;

use anyhow::Result;
use colored::*;
use humansize::{format_size, BINARY};
use tokio::sync::Notify;

use resmon::core::system_monitor::Snapshot;
use resmon::{MemoryPressure, MemorySnapshot, MonitorConfig, MonitorDeps, ProcessRecord, ResourceMonitor};

const SHOWN_PROCESSES: usize = 10;

#[tokio::main]
async fn main() -> Result<()> {
    resmon::init_logging();

    let config = MonitorConfig::load()?;
    let deps = MonitorDeps::system(&config)?;
    let monitor = ResourceMonitor::start(&config, deps);

    let stop = Arc::new(Notify::new());
    let stop_clone = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        println!();
        println!("{}", "Stopping monitor...".yellow().bold());
        stop_clone.notify_one();
    })
    .map_err(|e| anyhow::anyhow!("Failed to set Ctrl+C handler: {}", e))?;

    let mut processes = monitor.processes();
    let memory = monitor.memory();

    loop {
        tokio::select! {
            _ = stop.notified() => break,
            snapshot = processes.changed() => {
                let Some(snapshot) = snapshot else { break };
                print_memory(memory.current().as_deref());
                print_processes(&snapshot);
            }
        }
    }

    monitor.shutdown().await;
    Ok(())
}

fn print_memory(snapshot: Option<&Snapshot<MemorySnapshot>>) {
    let Some(snapshot) = snapshot else {
        println!("{}", "Memory: waiting for first sample".dimmed());
        return;
    };
    let mem = &snapshot.data;

    let pressure = match mem.pressure {
        MemoryPressure::Normal => mem.pressure.label().green(),
        MemoryPressure::Warning => mem.pressure.label().yellow(),
        MemoryPressure::Critical => mem.pressure.label().red().bold(),
    };

    println!(
        "{} {:.1} / {:.1} GB used ({:.1}%), {:.1} GB available [{}]",
        "Memory:".cyan().bold(),
        mem.used_gb,
        mem.total_gb,
        mem.used_percentage,
        mem.available_gb,
        pressure
    );
}

fn print_processes(snapshot: &Snapshot<Vec<ProcessRecord>>) {
    println!(
        "{}",
        format!("{:>7}  {:>10}  {:>6}  {}", "PID", "MEMORY", "CPU%", "NAME").dimmed()
    );
    for record in snapshot.data.iter().take(SHOWN_PROCESSES) {
        println!(
            "{:>7}  {:>10}  {:>6.1}  {}",
            record.pid,
            format_size(record.memory_bytes(), BINARY),
            record.cpu_percent,
            record.name.bold()
        );
    }
    println!();
}
