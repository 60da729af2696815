use anyhow::{Context, Result};
use clap::Parser;
use plan_lang::pddl::{find_domain_of, parse_pddl_domain, parse_pddl_problem};
use plan_lang::sas::parse_sas;
use plan_lang::{Input, Message};
use plan_translate::Translation;
use plan_translate::config::{EncodingKind, Reachability, TranslateOptions};
use std::path::{Path, PathBuf};

/// Translates a classical planning task (PDDL or SAS+) into a dynamic-programming model.
#[derive(Debug, Clone, Parser)]
#[command(name = "pddl2dp", rename_all = "kebab-case")]
pub struct Opt {
    /// Domain file, or a `.sas` file. If it is the only file given and is not a SAS+ task, it is taken as the
    /// problem and the domain is searched next to it.
    input: PathBuf,
    /// Problem file.
    problem: Option<PathBuf>,

    /// How atoms are represented as state variables.
    #[arg(long, value_enum, default_value_t = EncodingKind::default())]
    encoding: EncodingKind,
    /// Pruning of the ground actions.
    #[arg(long, value_enum, default_value_t = Reachability::default())]
    reachability: Reachability,
    /// Number of grounding threads (default: available parallelism).
    #[arg(long)]
    threads: Option<usize>,
    /// Maximal number of atoms in a mutex group.
    #[arg(long)]
    max_group_size: Option<usize>,
    /// Upper bound on the cost of solutions, recorded in the model.
    #[arg(long)]
    bound: Option<i64>,

    /// If set, a textual dump of the model is written to this file.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Logging level to use: one of "error", "warn", "info", "debug", "trace"
    #[arg(short, long, default_value = "info")]
    log_level: tracing::Level,
}

fn parse_error(msg: Message) -> anyhow::Error {
    anyhow::anyhow!("{msg}")
}

fn is_sas(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "sas")
}

fn read(path: &Path) -> Result<Input> {
    Input::from_file(path).with_context(|| format!("could not read {}", path.display()))
}

fn translate(opt: &Opt, options: &TranslateOptions) -> Result<Translation> {
    if is_sas(&opt.input) {
        anyhow::ensure!(opt.problem.is_none(), "a SAS+ task is given as a single file");
        let task = parse_sas(read(&opt.input)?).map_err(parse_error)?;
        return Ok(plan_translate::translate_sas(&task, options)?);
    }
    let (domain_file, problem_file) = match &opt.problem {
        Some(problem) => (opt.input.clone(), problem.clone()),
        None => {
            let domain = find_domain_of(&opt.input)
                .map_err(parse_error)
                .context("Consider giving the domain file explicitly")?;
            (domain, opt.input.clone())
        }
    };
    tracing::info!("domain: {}", domain_file.display());
    tracing::info!("problem: {}", problem_file.display());
    let dom = parse_pddl_domain(read(&domain_file)?).map_err(parse_error)?;
    let pb = parse_pddl_problem(read(&problem_file)?).map_err(parse_error)?;
    Ok(plan_translate::translate_pddl(&dom, &pb, options)?)
}

fn main() -> Result<()> {
    // a panic in a grounding worker terminates the process
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        std::process::exit(1);
    }));

    let opt = Opt::parse();

    // set up logger
    let subscriber = tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::Uptime::from(std::time::Instant::now()))
        .with_thread_ids(true)
        .with_max_level(opt.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut options = TranslateOptions::default()
        .with_encoding(opt.encoding)
        .with_reachability(opt.reachability)
        .with_bound(opt.bound);
    if let Some(threads) = opt.threads {
        options = options.with_threads(threads);
    }
    if let Some(size) = opt.max_group_size {
        options.max_group_size = size;
    }

    let translation = translate(&opt, &options)?;
    if translation.model.is_trivially_unsolvable() {
        tracing::warn!("the model is trivially unsolvable");
    }
    println!("{}", translation.stats);

    if let Some(output) = &opt.output {
        std::fs::write(output, translation.model.to_string())
            .with_context(|| format!("could not write the model to {}", output.display()))?;
        tracing::info!("model written to {}", output.display());
    }
    Ok(())
}
