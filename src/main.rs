use std::time::Duration;

use clap::{Parser, ValueEnum};
use rand::Rng;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use quorum_gate::config::GateConfig;
use quorum_gate::coordinator::AdmissionCoordinator;
use quorum_gate::job::{AdmittedNotice, Decision, JobKey};
use quorum_gate::membership::Membership;
use quorum_gate::pool::{WorkerCommand, WorkerHandle, WorkerId, WorkerPool};

#[derive(Parser, Debug)]
#[command(name = "quorum-gate")]
#[command(version)]
#[command(about = "Quorum-based admission control over a simulated worker pool")]
struct Args {
    /// Number of simulated workers in the pool
    #[arg(long, default_value = "3")]
    workers: u64,

    /// Number of jobs to submit
    #[arg(long, default_value = "5")]
    jobs: usize,

    /// Decision deadline in milliseconds
    #[arg(long, default_value = "3000")]
    deadline_ms: u64,

    /// Probability that a worker accepts a probe
    #[arg(long, default_value = "0.5")]
    accept_rate: f64,

    /// Probability that a worker never answers a probe
    #[arg(long, default_value = "0.0")]
    silent_rate: f64,

    /// Upper bound on simulated reply latency in milliseconds
    #[arg(long, default_value = "200")]
    reply_delay_ms: u64,

    /// Membership strategy
    #[arg(long, value_enum, default_value = "dynamic")]
    membership: MembershipArg,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MembershipArg {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct DecisionOutput {
    key: String,
    accepted: bool,
}

/// A simulated worker: answers probes with a random verdict after a random
/// delay, and occasionally stays silent to exercise the decision deadline.
async fn run_worker(
    id: WorkerId,
    mut commands: mpsc::Receiver<WorkerCommand>,
    accept_rate: f64,
    silent_rate: f64,
    max_delay_ms: u64,
) {
    while let Some(command) = commands.recv().await {
        match command {
            WorkerCommand::Probe { key, reply } => {
                let (delay, silent, accepts) = {
                    let mut rng = rand::thread_rng();
                    (
                        rng.gen_range(0..=max_delay_ms),
                        rng.gen_bool(silent_rate),
                        rng.gen_bool(accept_rate),
                    )
                };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                if silent {
                    tracing::debug!(worker_id = id, key = %key, "Worker staying silent");
                    continue;
                }
                if accepts {
                    reply.accept(key, id).await;
                } else {
                    reply.reject(key, id).await;
                }
            }
            WorkerCommand::BeginWork { key } => {
                tracing::info!(worker_id = id, key = %key, "Worker starting job");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let accept_rate = args.accept_rate.clamp(0.0, 1.0);
    let silent_rate = args.silent_rate.clamp(0.0, 1.0);

    let pool = WorkerPool::new();
    for id in 1..=args.workers {
        let (tx, rx) = mpsc::channel(16);
        pool.register(WorkerHandle::new(id, tx));
        tokio::spawn(run_worker(
            id,
            rx,
            accept_rate,
            silent_rate,
            args.reply_delay_ms,
        ));
    }

    let (notices_tx, mut notices_rx) = mpsc::channel::<AdmittedNotice>(16);
    tokio::spawn(async move {
        while let Some(notice) = notices_rx.recv().await {
            tracing::info!(
                key = %notice.key,
                worker_id = notice.worker,
                admitted_at = %notice.admitted_at,
                "Job admitted"
            );
        }
    });

    let membership = match args.membership {
        MembershipArg::Static => Membership::Static(args.workers as usize),
        MembershipArg::Dynamic => Membership::Dynamic,
    };
    let config = GateConfig::new().with_decision_timeout(Duration::from_millis(args.deadline_ms));
    let coordinator = {
        let pool = pool.clone();
        AdmissionCoordinator::spawn(config, membership, move || pool.clone(), Some(notices_tx))
    };

    // Submit everything up front so concurrent submissions get deferred and
    // replayed rather than trickling in one at a time.
    let mut pending = Vec::new();
    for _ in 0..args.jobs {
        pending.push(coordinator.submit(JobKey::new()).await?);
    }

    let mut decisions: Vec<Decision> = Vec::new();
    for admission in pending {
        let key = admission.key();
        match admission.await_decision().await {
            Ok(decision) => decisions.push(decision),
            Err(e) => eprintln!("Error: no decision for {}: {}", key, e),
        }
    }

    match args.output {
        OutputFormat::Json => {
            let out: Vec<DecisionOutput> = decisions
                .iter()
                .map(|d| DecisionOutput {
                    key: d.key().to_string(),
                    accepted: d.is_accepted(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            println!("{:<38} DECISION", "JOB KEY");
            println!("{}", "-".repeat(47));
            for decision in &decisions {
                let verdict = if decision.is_accepted() {
                    "accepted"
                } else {
                    "rejected"
                };
                println!("{:<38} {}", decision.key().to_string(), verdict);
            }
            let admitted = decisions.iter().filter(|d| d.is_accepted()).count();
            println!();
            println!("Admitted {} of {} jobs", admitted, decisions.len());
        }
    }

    coordinator.shutdown();
    Ok(())
}
