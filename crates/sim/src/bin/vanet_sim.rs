//! VANET protocol stack simulation

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use vanet_core::Position;
use vanet_radio::{ProtocolStack, SimulationReport, StackConfig};
use vanet_sim::scenarios::{self, PlatoonConfig, RsuConfig, RsuSummary, ScenarioSummary};
use vanet_sim::{load_stack_config, Preset};

#[derive(Parser, Debug)]
#[command(name = "vanet_sim")]
#[command(author, version, about, long_about = None)]
struct Options {
    /// Operating conditions to simulate
    #[arg(long, value_enum, default_value_t = Preset::Urban)]
    preset: Preset,

    /// JSON stack configuration; overrides --preset
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for every random draw in the run
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Where to write the JSON report
    #[arg(short, long, default_value = "vanet_simulation_report.json")]
    output: PathBuf,
}

impl Options {
    fn stack_config(&self) -> Result<StackConfig> {
        match &self.config {
            Some(path) => load_stack_config(path),
            None => Ok(self.preset.config()),
        }
    }
}

struct RunOutput {
    stack: ProtocolStack,
    scenarios: Vec<ScenarioSummary>,
    rsu: RsuSummary,
}

fn print_summary(summary: &ScenarioSummary) {
    let ratio = format!("{:.1}%", summary.delivery_ratio * 100.0);
    let ratio = if summary.delivery_ratio >= 0.9 { ratio.bright_green() } else { ratio.bright_red() };
    println!(
        "  {:<20} sent {:>5}  delivered {:>5} ({})  mean delay {:.3} ms  max {:.3} ms  collisions {}",
        summary.name, summary.sent, summary.delivered, ratio, summary.mean_delay_ms, summary.max_delay_ms, summary.collisions
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let options = Options::parse();
    let config = options.stack_config()?;

    println!("{}", "VANET Protocol Stack Simulation".bright_blue().bold());
    println!("{}", "===============================".bright_blue());
    match &options.config {
        Some(path) => println!("Config: {}", path.display()),
        None => println!("Preset: {:?}", options.preset),
    }
    println!("Environment: {}", config.environment);
    println!("Channel busy ratio: {:.2}", config.edca.initial_busy_ratio);
    println!("Seed: {}", options.seed);
    println!();

    let stack = ProtocolStack::new(config).context("building protocol stack")?;
    let reader = stack.snapshot();

    let platoon = PlatoonConfig::default();
    let rsu = RsuConfig::default();
    let emergency_repeats = 10;
    let total = (platoon.rounds + emergency_repeats + rsu.ticks) as u64;

    let progress = ProgressBar::new(total);
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("progress template")?
            .progress_chars("=> "),
    );

    let monitor = {
        let reader = reader.clone();
        let progress = progress.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(100));
            loop {
                ticker.tick().await;
                let snapshot = reader.load();
                progress.set_message(format!(
                    "t={} PDR {:.1}%",
                    snapshot.now,
                    snapshot.stats.packet_delivery_ratio * 100.0
                ));
            }
        })
    };

    let seed = options.seed;
    let worker_progress = progress.clone();
    let run = tokio::task::spawn_blocking(move || -> Result<RunOutput> {
        let mut stack = stack;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let tick = |_: usize| worker_progress.inc(1);

        let platoon_summary = scenarios::platoon(&mut stack, &platoon, &mut rng, tick)?;
        let receivers: Vec<Position> = (1..=8).map(|i| Position::new(i as f64 * 40.0, 3.5)).collect();
        let emergency_summary =
            scenarios::emergency_broadcast(&mut stack, Position::new(0.0, 0.0), &receivers, emergency_repeats, &mut rng, tick)?;
        scenarios::fog_offload(&mut stack, &[0.2, 1.0, 5.0], 64_000, &mut rng)?;
        let (_, rsu_summary) = scenarios::rsu_coverage(&stack.config().wimax, &rsu, &mut rng, tick)?;

        Ok(RunOutput { stack, scenarios: vec![platoon_summary, emergency_summary], rsu: rsu_summary })
    });

    let output = run.await.context("simulation thread panicked")??;
    monitor.abort();
    progress.finish_with_message("done");

    println!();
    println!("{}", "V2V scenarios".bright_yellow().bold());
    for summary in &output.scenarios {
        print_summary(summary);
    }

    let stats = output.stack.statistics();
    println!();
    println!("{}", "Protocol stack".bright_yellow().bold());
    println!("  Packet delivery ratio: {:.1}%", stats.packet_delivery_ratio * 100.0);
    println!("  Delay: {:.3} ms mean, {:.3} ms std", stats.mean_delay_ms, stats.std_delay_ms);
    println!("  Mean SNR: {:.1} dB, mean PER: {:.2e}", stats.mean_snr_db, stats.mean_per);
    println!("  MAC collisions: {}, mean backoff {:.3} ms", stats.total_collisions, stats.mean_backoff_ms);
    println!(
        "  V2I: {} sends, {:.1}% delivered, {:.1} ms mean latency",
        stats.v2i_transmissions,
        stats.v2i_delivery_ratio * 100.0,
        stats.mean_v2i_latency_ms
    );

    let rsu = &output.rsu;
    println!();
    println!("{}", "WiMAX roadside unit".bright_yellow().bold());
    println!("  Frames: {}, handoffs: {}, still attached: {}", rsu.frames, rsu.handed_off, rsu.attached_at_end);
    println!("  Delivered: {} bytes, mean latency {:.1} ms", rsu.delivered_bytes, rsu.mean_latency_ms);
    println!("  tx {} / rx {} bytes, utilization {:.1}%", rsu.tx_bytes, rsu.rx_bytes, rsu.utilization * 100.0);

    let report = SimulationReport::from_stack(&output.stack, Some(options.seed));
    report
        .write_to(&options.output)
        .with_context(|| format!("writing report to {}", options.output.display()))?;
    println!();
    println!("{} {}", "Report written to".bright_green().bold(), options.output.display());

    Ok(())
}
