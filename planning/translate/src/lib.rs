//! Translation of classical planning tasks into dynamic-programming models.
//!
//! A PDDL task goes through the following phases:
//!  - [`load`]: the parsed domain and problem are checked against each other and turned into a lifted [`Task`],
//!  - [`ground`]: action schemas are instantiated with the objects of the problem, restricted to
//!    (an over-approximation of) the reachable ones,
//!  - [`encode`]: ground atoms are partitioned into finite-domain state variables,
//!  - [`compile`]: ground actions and the goal become the transitions and base case of a [`Model`].
//!
//! A SAS+ task is already grounded and factored: its variables are used as is.

pub mod compile;
pub mod config;
pub mod encode;
pub mod errors;
pub mod ground;
pub mod load;
pub mod symbols;
pub mod task;

use crate::compile::CompileStats;
use crate::config::{EncodingKind, TranslateOptions};
use crate::encode::Encoding;
use crate::errors::Result;
use crate::ground::{GroundTask, Progress};
use crate::task::Task;
use dp_model::Model;
use plan_lang::pddl::{Domain, Problem};
use plan_lang::sas::SasTask;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

/// Size of the intermediate representations and time spent in each phase.
#[derive(Clone, Debug, Default)]
pub struct Stats {
    pub atoms: usize,
    pub ground_actions: usize,
    pub mutex_groups: usize,
    pub variables: usize,
    pub transitions: usize,
    pub discarded_transitions: usize,
    pub unreachable_goals: usize,
    pub loading: Duration,
    pub grounding: Duration,
    pub encoding: Duration,
    pub compilation: Duration,
}

impl Display for Stats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "atoms:              {}", self.atoms)?;
        writeln!(f, "ground actions:     {}", self.ground_actions)?;
        writeln!(f, "mutex groups:       {}", self.mutex_groups)?;
        writeln!(f, "state variables:    {}", self.variables)?;
        writeln!(f, "transitions:        {}", self.transitions)?;
        writeln!(f, "discarded:          {}", self.discarded_transitions)?;
        writeln!(f, "unreachable goals:  {}", self.unreachable_goals)?;
        write!(
            f,
            "runtime:            {:.3}s (loading: {:.3}s, grounding: {:.3}s, encoding: {:.3}s, compilation: {:.3}s)",
            (self.loading + self.grounding + self.encoding + self.compilation).as_secs_f64(),
            self.loading.as_secs_f64(),
            self.grounding.as_secs_f64(),
            self.encoding.as_secs_f64(),
            self.compilation.as_secs_f64()
        )
    }
}

impl Stats {
    fn record_compilation(&mut self, model: &Model, compiled: &CompileStats) {
        self.variables = model.num_variables();
        self.transitions = compiled.transitions;
        self.discarded_transitions = compiled.contradictory;
        self.unreachable_goals = compiled.unreachable_goals;
    }
}

/// Result of a translation: the model and the intermediate representations it was derived from.
pub struct Translation {
    pub model: Model,
    /// Correspondence between the atoms of the task and the state variables of the model.
    pub encoding: Encoding,
    /// The lifted task, absent for SAS+ inputs.
    pub lifted: Option<Task>,
    /// The ground task, absent for SAS+ inputs.
    pub ground: Option<GroundTask>,
    pub stats: Stats,
}

pub fn translate_pddl(dom: &Domain, pb: &Problem, options: &TranslateOptions) -> Result<Translation> {
    translate_pddl_with_progress(dom, pb, options, &Progress::new())
}

/// Same as [`translate_pddl`], reporting grounding progress to `progress` which may be used to cancel the translation.
pub fn translate_pddl_with_progress(
    dom: &Domain,
    pb: &Problem,
    options: &TranslateOptions,
    progress: &Progress,
) -> Result<Translation> {
    let start = Instant::now();
    let task = load::load_task(dom, pb)?;
    let loading = start.elapsed();
    let mut translation = translate_task(task, options, progress)?;
    translation.stats.loading = loading;
    Ok(translation)
}

/// Grounds, encodes and compiles a lifted task.
pub fn translate_task(task: Task, options: &TranslateOptions, progress: &Progress) -> Result<Translation> {
    let _span = tracing::span!(tracing::Level::DEBUG, "TRANSLATE").entered();
    let mut stats = Stats::default();

    let start = Instant::now();
    let ground = ground::ground(&task, options, progress)?;
    stats.grounding = start.elapsed();
    stats.atoms = ground.num_atoms();
    stats.ground_actions = ground.actions.len();
    tracing::info!(
        "grounded {} actions over {} atoms in {:.3}s",
        stats.ground_actions,
        stats.atoms,
        stats.grounding.as_secs_f64()
    );

    let start = Instant::now();
    let encoding = match options.encoding {
        EncodingKind::Direct => Encoding::direct(&ground),
        EncodingKind::Invariant => {
            let (encoding, groups) = Encoding::invariant(&ground, options.max_group_size, options.mutex_refinements);
            stats.mutex_groups = groups.groups.len();
            encoding
        }
    };
    stats.encoding = start.elapsed();
    tracing::info!(
        "{} encoding: {} state variables ({} mutex groups)",
        options.encoding,
        encoding.num_vars(),
        stats.mutex_groups
    );

    let start = Instant::now();
    let (model, compiled) = compile::compile(&ground, &encoding, options)?;
    stats.compilation = start.elapsed();
    stats.record_compilation(&model, &compiled);

    Ok(Translation {
        model,
        encoding,
        lifted: Some(task),
        ground: Some(ground),
        stats,
    })
}

pub fn translate_sas(task: &SasTask, options: &TranslateOptions) -> Result<Translation> {
    let _span = tracing::span!(tracing::Level::DEBUG, "TRANSLATE").entered();
    let start = Instant::now();
    let (model, encoding, compiled) = compile::compile_sas(task, options)?;
    let mut stats = Stats {
        atoms: encoding.num_atoms(),
        ground_actions: task.operators.len(),
        compilation: start.elapsed(),
        ..Default::default()
    };
    stats.record_compilation(&model, &compiled);
    Ok(Translation {
        model,
        encoding,
        lifted: None,
        ground: None,
        stats,
    })
}
