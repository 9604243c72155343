//! Command-line driver for the relay exploration engine.

mod demos;

use clap::{Parser, Subcommand};
use relay_engine::{Scheduler, SchedulerConfig, SearchOutcome};
use relay_solver::SolverContext;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relay", version)]
#[command(about = "Symbolic exploration engine for communicating state machines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore a built-in demo program
    Run {
        /// Demo name (see `relay demos`)
        #[arg(value_name = "DEMO")]
        demo: String,

        /// Maximum scheduling steps (0 = unlimited)
        #[arg(long, default_value = "1000")]
        max_steps: usize,

        /// Maximum per-machine internal steps per event (0 = unlimited)
        #[arg(long, default_value = "1000")]
        max_internal_steps: usize,

        /// Receiver-queue order reduction
        #[arg(long, help_heading = "Reductions")]
        receiver_queue: bool,

        /// Unordered (bag) event buffers
        #[arg(long, help_heading = "Reductions")]
        bag: bool,

        /// Sleep-set pruning
        #[arg(long, help_heading = "Reductions")]
        sleep_sets: bool,

        /// Interleave-order filter
        #[arg(long, help_heading = "Reductions")]
        filters: bool,

        /// Concrete-state caching and candidate filtering
        #[arg(long, help_heading = "Reductions")]
        state_caching: bool,

        /// Snapshot source state each step for backtracking
        #[arg(long)]
        backtrack: bool,

        /// Track vector clocks even without receiver semantics
        #[arg(long)]
        dpor: bool,

        /// Statistics collection level (0-4)
        #[arg(long, default_value = "1")]
        collect_stats: u32,

        /// Log verbosity (0-5)
        #[arg(short, long, default_value = "0")]
        verbosity: u32,

        /// Memory cap in MB (0 = unlimited)
        #[arg(long, default_value = "0")]
        mem_limit: f64,

        /// Wall-clock cap in seconds (0 = unlimited)
        #[arg(long, default_value = "0")]
        time_limit: f64,
    },

    /// List the built-in demo programs
    Demos,
}

fn main() {
    let cli = Cli::parse();

    let verbosity = match &cli.command {
        Commands::Run { verbosity, .. } => *verbosity,
        Commands::Demos => 0,
    };
    let filter = match verbosity {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 | 3 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Commands::Demos => {
            for (name, blurb) in demos::DEMO_NAMES {
                println!("{:10} {}", name, blurb);
            }
        }
        Commands::Run {
            demo,
            max_steps,
            max_internal_steps,
            receiver_queue,
            bag,
            sleep_sets,
            filters,
            state_caching,
            backtrack,
            dpor,
            collect_stats,
            verbosity,
            mem_limit,
            time_limit,
        } => {
            let Some(program) = demos::demo(&demo) else {
                eprintln!("unknown demo '{}'; try `relay demos`", demo);
                std::process::exit(1);
            };
            let config = SchedulerConfig {
                use_receiver_queue_semantics: receiver_queue,
                use_bag_semantics: bag,
                use_sleep_sets: sleep_sets,
                use_filters: filters,
                use_state_caching: state_caching,
                use_backtrack: backtrack,
                is_dpor: dpor,
                max_step_bound: max_steps,
                max_internal_steps,
                collect_stats,
                verbosity,
                mem_limit_mb: mem_limit,
                time_limit_secs: time_limit,
            };

            SolverContext::reset();
            let mut scheduler = Scheduler::new(config, program);
            let outcome = match scheduler.do_search() {
                Ok(outcome) => outcome,
                Err(e) => {
                    eprintln!("engine fault: {}", e);
                    std::process::exit(2);
                }
            };

            println!();
            match &outcome {
                SearchOutcome::Ok {
                    depth,
                    distinct_states,
                } => {
                    println!("Result: OK");
                    println!("  Depth explored: {}", depth);
                    println!("  Distinct states: {}", distinct_states);
                }
                SearchOutcome::Bug { message } => {
                    println!("Result: BUG");
                    println!("  {}", message);
                }
                SearchOutcome::Timeout { seconds } => {
                    println!("Result: TIMEOUT after {:.1}s", seconds);
                }
                SearchOutcome::Memout { megabytes } => {
                    println!("Result: MEMOUT at {:.1} MB", megabytes);
                }
            }
            for (key, value) in scheduler.stat_writer().entries() {
                println!("  {} = {}", key, value);
            }
            std::process::exit(outcome.exit_code());
        }
    }
}
