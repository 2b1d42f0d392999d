use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use swarm::config::{BuiltSwarm, SwarmSpec};
use swarm::{ledger, Agent, CoordinationResult, JsonLinesSink, Message};

/// Swarm: run scripted agent swarms from a YAML spec.
#[derive(Parser, Debug)]
#[command(name = "swarm")]
#[command(about = "Run an in-process agent swarm from a YAML spec", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hand a task to the swarm's coordinator and print the final answer
    Run {
        /// Path to the swarm spec YAML
        path: PathBuf,

        /// Task text
        #[arg(long)]
        task: String,

        /// Print the message ledger after the run
        #[arg(long)]
        print_ledger: bool,

        /// Write the ledger as pretty JSON to this path
        #[arg(long)]
        ledger_out: Option<PathBuf>,

        /// Stream each ledger append to stderr as a JSON line
        #[arg(long)]
        stream_ledger: bool,
    },

    /// Record a broadcast from one agent and print who it reaches
    Broadcast {
        /// Path to the swarm spec YAML
        path: PathBuf,

        /// Sending agent
        #[arg(long)]
        from: String,

        /// Message content
        #[arg(long)]
        content: String,

        /// Print the message ledger afterwards
        #[arg(long)]
        print_ledger: bool,
    },

    /// Print the registry and coordinator a spec builds
    Agents {
        /// Path to the swarm spec YAML
        path: PathBuf,
    },
}

fn print_error_chain(err: &anyhow::Error) {
    eprintln!("Error: {err}");

    let mut n = 0;
    let mut cur = err.source();
    while let Some(cause) = cur {
        eprintln!("  {n}: {cause}");
        n += 1;
        cur = cause.source();
    }
}

fn main() {
    if let Err(err) = real_main() {
        print_error_chain(&err);
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Command::Run {
            path,
            task,
            print_ledger,
            ledger_out,
            stream_ledger,
        } => {
            let built = load(&path)?;
            if stream_ledger {
                built.swarm.subscribe(JsonLinesSink::new(std::io::stderr()));
            }

            let result = built.swarm.run(task).context("swarm run failed")?;
            let answer = result
                .final_answer()
                .ok_or_else(|| anyhow!("coordinator returned no answer for a task"))?;
            println!("RESULT: {answer}");
            print_summary(&built);

            if print_ledger {
                ledger::print_ledger(&built.swarm);
            }
            if let Some(out) = ledger_out {
                ledger::write_ledger_artifact(&out, &built.swarm.messages())?;
            }
            Ok(())
        }
        Command::Broadcast {
            path,
            from,
            content,
            print_ledger,
        } => {
            let built = load(&path)?;
            let result = built
                .swarm
                .run(Message::broadcast(from, content))
                .context("swarm broadcast failed")?;
            match result {
                CoordinationResult::Routed(recipients) => {
                    println!("ROUTED to={}", recipients.join(","));
                }
                CoordinationResult::Response(resp) => {
                    println!("RESULT: {}", resp.final_answer());
                }
            }
            if print_ledger {
                ledger::print_ledger(&built.swarm);
            }
            Ok(())
        }
        Command::Agents { path } => {
            let built = load(&path)?;
            let coordinator = built
                .swarm
                .coordinator()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "<none>".to_string());
            println!("Coordinator: {coordinator}");
            println!("Parallel:    {}", built.max_parallel);
            println!("Agents:      {}", built.swarm.len());
            for (idx, name) in built.swarm.agent_names().iter().enumerate() {
                println!("  {idx}. {name}");
            }
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<BuiltSwarm> {
    let spec = SwarmSpec::load_from_file(path)
        .with_context(|| format!("failed to load swarm spec: {}", path.display()))?;
    spec.build()
}

fn print_summary(built: &BuiltSwarm) {
    let coordinator = built
        .swarm
        .coordinator()
        .map(|c| c.name().to_string())
        .unwrap_or_default();
    println!(
        "RUN SUMMARY: coordinator={coordinator} agents={} messages={}",
        built.swarm.len(),
        built.swarm.message_count()
    );
    for agent in &built.agents {
        println!("  agent={} calls={}", agent.name(), agent.call_count());
    }
}
