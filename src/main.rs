use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use cssputer::asm::{assemble, Program};
use cssputer::cpu::{self, Halt};
use cssputer::emit::{circuit_hash, labels_json, write_documents};
use cssputer::{CpuConfig, Simulator};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cssputer", version, about = "Compile a stored-program computer into checkbox rules")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct MachineArgs {
    /// Program listing in `.cca` format
    #[arg(long)]
    input: PathBuf,
    /// JSON file with memory_size / bit_width / phase_len
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    memory_size: Option<usize>,
    #[arg(long)]
    bit_width: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a program and print its memory image
    Asm {
        #[command(flatten)]
        machine: MachineArgs,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Compile the machine and splice it into page and stylesheet templates
    Build {
        #[command(flatten)]
        machine: MachineArgs,
        #[arg(long, default_value = "index.html")]
        html: PathBuf,
        #[arg(long, default_value = "puter.css")]
        css: PathBuf,
        /// Also write the label table as JSON
        #[arg(long)]
        labels: Option<PathBuf>,
    },
    /// Print circuit size and identity
    Stats {
        #[command(flatten)]
        machine: MachineArgs,
    },
    /// Simulate the compiled machine until it exits
    Run {
        #[command(flatten)]
        machine: MachineArgs,
        #[arg(long, default_value_t = 5_000_000)]
        steps: usize,
    },
}

impl MachineArgs {
    fn config(&self) -> Result<CpuConfig> {
        let mut config = match &self.config {
            Some(path) => CpuConfig::from_json_file(path)?,
            None => CpuConfig::default(),
        };
        if let Some(memory_size) = self.memory_size {
            config.memory_size = memory_size;
        }
        if let Some(bit_width) = self.bit_width {
            config.bit_width = bit_width;
        }
        config.validate()?;
        Ok(config)
    }

    fn program(&self, config: &CpuConfig) -> Result<Program> {
        let source = fs::read_to_string(&self.input)
            .with_context(|| format!("reading {}", self.input.display()))?;
        assemble(&source, config.bit_width).map_err(|e| anyhow!("{}: {}", self.input.display(), e))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cssputer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Asm { machine, json } => {
            let config = machine.config()?;
            let program = machine.program(&config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&program)?);
            } else {
                print_program(&program);
            }
        }
        Commands::Build {
            machine,
            html,
            css,
            labels,
        } => {
            let config = machine.config()?;
            let program = machine.program(&config)?;
            let (hw, _) = cpu::compile(&config, &program.image)?;
            write_documents(&hw, &html, &css)?;
            if let Some(path) = labels {
                write_labels(&path, &labels_json(&hw)?)?;
            }
            println!(
                "built cells={} rules={} html={} css={}",
                hw.cell_count(),
                hw.rules().len(),
                html.display(),
                css.display()
            );
        }
        Commands::Stats { machine } => {
            let config = machine.config()?;
            let program = machine.program(&config)?;
            let (hw, _) = cpu::compile(&config, &program.image)?;
            println!("image rows:  {}", program.image.len());
            println!("cells:       {}", hw.cell_count());
            println!("rules:       {}", hw.rules().len());
            println!("labels:      {}", hw.labels().len());
            println!("memo hits:   {}", hw.memo_hits());
            println!("circuit:     blake3:{}", circuit_hash(&hw));
        }
        Commands::Run { machine, steps } => {
            let config = machine.config()?;
            let program = machine.program(&config)?;
            let (hw, machine) = cpu::compile(&config, &program.image)?;
            let mut sim = Simulator::new(&hw);
            let halt = machine.run(&mut sim, steps)?;
            match halt {
                Halt::Exited { steps } => println!("exited after {} flips", steps),
                Halt::Stalled => println!("stalled after {} flips", sim.steps()),
                Halt::StepLimit => println!("step limit of {} reached", steps),
            }
            println!("accumulator = {:#04x}", sim.read(machine.accumulator()));
            println!("ip          = {}", sim.read(machine.instruction_pointer().value()));
            for (name, location) in &program.symbols {
                if let Some(row) = machine.memory().row(*location) {
                    println!("{:<12}= {:#04x}", name, sim.read(row));
                }
            }
        }
    }
    Ok(())
}

fn print_program(program: &Program) {
    for (row, chunk) in program.image.chunks(8).enumerate() {
        let cells: Vec<String> = chunk.iter().map(|v| format!("{:02x}", v)).collect();
        println!("{:04x}: {}", row * 8, cells.join(" "));
    }
    for (name, location) in &program.symbols {
        println!("{} @ {:#04x}", name, location);
    }
}

fn write_labels(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, json)?;
    Ok(())
}
