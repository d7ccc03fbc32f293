//! Command line interface

use std::path::PathBuf;

use circuitgraph::analysis::{influence, sensitivity, supergate_influences};
use circuitgraph::circuit::lint::LintOptions;
use circuitgraph::circuit::stats::stats;
use circuitgraph::io::{read_circuit_file, write_circuit_file};
use circuitgraph::sat::{solve, ApproxMcConfig};
use circuitgraph::transform::{
    limit_fanin, limit_fanout, miter_with_difs, sequential_unroll, UnrollOptions,
};
use circuitgraph::{Error, Result};
use clap::{Args, Parser, Subcommand};
use kdam::{tqdm, BarExt};
use log::info;

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity: -v for information, -vv for debug messages
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Command line arguments
#[derive(Subcommand)]
pub enum Commands {
    /// Show statistics about a circuit
    ///
    /// Will print statistics on the number of inputs, outputs and gates in the circuit,
    /// followed by the structural problems found.
    #[clap()]
    Show(ShowArgs),

    /// Check equivalence between two circuits
    ///
    /// Registers are matched by name and compared as inputs and outputs.
    /// The command will fail if the two circuits are not equivalent, and will output the
    /// failing input values.
    #[clap(alias = "check-equivalence")]
    Equiv(EquivArgs),

    /// Compute the sensitivity of a node
    ///
    /// This is the maximum number of its startpoints that change its value when flipped alone.
    #[clap(alias = "sens")]
    Sensitivity(SensitivityArgs),

    /// Compute the influence of each startpoint on a node
    ///
    /// The influence is the probability that flipping the startpoint changes the node,
    /// for uniformly random values of the other startpoints.
    #[clap()]
    Influence(InfluenceArgs),

    /// Unroll a sequential circuit over several clock cycles
    #[clap()]
    Unroll(UnrollArgs),

    /// Limit the fanin or fanout of the nodes of a circuit
    #[clap()]
    Limit(LimitArgs),
}

impl Commands {
    /// Run the selected command
    pub fn run(&self) -> Result<()> {
        match self {
            Commands::Show(a) => a.run(),
            Commands::Equiv(a) => a.run(),
            Commands::Sensitivity(a) => a.run(),
            Commands::Influence(a) => a.run(),
            Commands::Unroll(a) => a.run(),
            Commands::Limit(a) => a.run(),
        }
    }
}

/// Command arguments for circuit informations
#[derive(Args)]
pub struct ShowArgs {
    /// Circuit to show
    file: PathBuf,
}

impl ShowArgs {
    pub fn run(&self) -> Result<()> {
        let c = read_circuit_file(&self.file)?;
        println!("Circuit stats:\n{}\n", stats(&c));
        let issues = c.lint(&LintOptions::default());
        if issues.is_empty() {
            println!("No issues found");
        } else {
            println!("{} issues found:", issues.len());
            for issue in issues {
                println!("  {}", issue);
            }
        }
        Ok(())
    }
}

/// Command arguments for equivalence checking
#[derive(Args)]
pub struct EquivArgs {
    /// First circuit to compare
    file1: PathBuf,
    /// Second circuit to compare
    file2: PathBuf,
}

impl EquivArgs {
    pub fn run(&self) -> Result<()> {
        let c1 = read_circuit_file(&self.file1)?;
        let c2 = read_circuit_file(&self.file2)?;
        if c1.inputs() != c2.inputs() {
            println!("Different inputs. Circuits are not equivalent");
            std::process::exit(1);
        }
        if c1.outputs() != c2.outputs() {
            println!("Different outputs. Circuits are not equivalent");
            std::process::exit(1);
        }
        let (m, difs) = miter_with_difs(&c1, Some(&c2), None, None)?;
        match solve(&m, [("sat", true)])? {
            Some(model) => {
                println!("Circuits are not equivalent");
                println!("Failing values:");
                let startpoints = m.startpoints();
                for (n, v) in model.iter().filter(|(n, _)| startpoints.contains(*n)) {
                    println!("  {}: {}", n, if *v { "1" } else { "0" });
                }
                for (e, dif) in &difs {
                    if model.get(dif).copied().unwrap_or(false) {
                        println!("Difference on {}", e);
                    }
                }
                std::process::exit(1);
            }
            None => {
                println!("Circuits are equivalent");
                Ok(())
            }
        }
    }
}

/// Command arguments for sensitivity computation
#[derive(Args)]
pub struct SensitivityArgs {
    /// Circuit to analyze
    file: PathBuf,

    /// Node to compute the sensitivity of
    node: String,
}

impl SensitivityArgs {
    pub fn run(&self) -> Result<()> {
        let c = read_circuit_file(&self.file)?;
        let sen = sensitivity(&c, &self.node)?;
        println!("Sensitivity of {}: {}", self.node, sen);
        Ok(())
    }
}

/// Command arguments for influence computation
#[derive(Args)]
pub struct InfluenceArgs {
    /// Circuit to analyze
    file: PathBuf,

    /// Node to compute influences on
    node: String,

    /// Use approximate model counting with approxmc instead of enumeration
    #[arg(long)]
    approx: bool,

    /// Tolerance for approximate counting
    #[arg(long, default_value_t = 0.8)]
    epsilon: f64,

    /// Confidence for approximate counting
    #[arg(long, default_value_t = 0.2)]
    delta: f64,

    /// Random seed for approximate counting
    #[arg(long)]
    seed: Option<u64>,

    /// Compute influences inside supergates and multiply them along the cone
    ///
    /// Faster on large cones, but only exact when the cone is fanout-free.
    #[arg(long)]
    supergates: bool,
}

impl InfluenceArgs {
    pub fn run(&self) -> Result<()> {
        let c = read_circuit_file(&self.file)?;
        let config = self.approx.then(|| {
            let config = ApproxMcConfig::new()
                .with_epsilon(self.epsilon)
                .with_delta(self.delta);
            match self.seed {
                Some(s) => config.with_seed(s),
                None => config,
            }
        });
        let results: Vec<(String, f64)> = if self.supergates {
            supergate_influences(&c, &self.node, config.as_ref())?
                .into_iter()
                .collect()
        } else {
            let startpoints = c.startpoints_of([&self.node])?;
            let mut progress = tqdm!(total = startpoints.len());
            progress.set_description("Startpoints processed");
            let mut results = Vec::new();
            for s in startpoints {
                let inf = influence(&c, &self.node, &s, config.as_ref())?;
                results.push((s, inf));
                progress.update(1)?;
            }
            progress.write(format!(
                "Computed the influence of {} startpoints on {}",
                results.len(),
                self.node
            ))?;
            results
        };
        let total: f64 = results.iter().map(|(_, inf)| inf).sum();
        for (s, inf) in results {
            println!("{}: {:.4}", s, inf);
        }
        println!("Average sensitivity: {:.4}", total);
        Ok(())
    }
}

/// Command arguments for sequential unrolling
#[derive(Args)]
pub struct UnrollArgs {
    /// Circuit to unroll
    file: PathBuf,

    /// Output file for the unrolled circuit
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Number of clock cycles
    #[arg(short = 'c', long, default_value_t = 1)]
    num_cycles: usize,

    /// Prefix used to name the copies of the registers and inputs
    #[arg(long, default_value = "cg_unroll")]
    prefix: String,

    /// Start with all registers at zero instead of free values
    #[arg(long)]
    zero_init: bool,

    /// Keep the data signals of the registers as outputs of each cycle
    #[arg(long)]
    flop_outputs: bool,
}

impl UnrollArgs {
    pub fn run(&self) -> Result<()> {
        let c = read_circuit_file(&self.file)?;
        let mut opts = UnrollOptions::default()
            .with_prefix(&self.prefix)
            .with_flop_outputs(self.flop_outputs);
        if self.zero_init {
            for q in c.registers() {
                opts = opts.with_initial_value(&q, false);
            }
        }
        let (u, _) = sequential_unroll(&c, self.num_cycles, &opts)?;
        info!(
            "Unrolled {} over {} cycles: {} nodes",
            c.name(),
            self.num_cycles,
            u.nb_nodes()
        );
        write_circuit_file(&self.output, &u)
    }
}

/// Command arguments for fanin and fanout limiting
#[derive(Args)]
pub struct LimitArgs {
    /// Circuit to transform
    file: PathBuf,

    /// Output file for the transformed circuit
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Maximum fanin of a gate
    #[arg(long)]
    fanin: Option<usize>,

    /// Maximum fanout of a node
    #[arg(long)]
    fanout: Option<usize>,
}

impl LimitArgs {
    pub fn run(&self) -> Result<()> {
        if self.fanin.is_none() && self.fanout.is_none() {
            return Err(Error::Precondition(
                "At least one of --fanin and --fanout is required".to_string(),
            ));
        }
        let mut c = read_circuit_file(&self.file)?;
        if let Some(k) = self.fanin {
            c = limit_fanin(&c, k)?;
        }
        if let Some(k) = self.fanout {
            c = limit_fanout(&c, k)?;
        }
        write_circuit_file(&self.output, &c)
    }
}
