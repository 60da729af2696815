//! Tuning parameters of the translation.
//!
//! Defaults are read from environment variables (see [`EnvParam`]) so that internal parameters
//! can be adjusted without exposing them on every command line.

use once_cell::sync::OnceCell;
use std::str::FromStr;

/// A parameter whose value is read from an environment variable on first access,
/// falling back to a default value if the variable is absent or invalid.
///
/// ```
/// use plan_translate::config::EnvParam;
/// static DEPTH: EnvParam<u32> = EnvParam::new("PDDL2DP_DOC_DEPTH", "3");
/// assert_eq!(DEPTH.get(), 3);
/// ```
pub struct EnvParam<T> {
    value: OnceCell<T>,
    env: &'static str,
    default: &'static str,
}

impl<T> EnvParam<T> {
    pub const fn new(env: &'static str, default: &'static str) -> EnvParam<T> {
        EnvParam {
            value: OnceCell::new(),
            env,
            default,
        }
    }
}

impl<T: FromStr> EnvParam<T> {
    fn read_default(&self) -> T {
        match T::from_str(self.default) {
            Ok(v) => v,
            Err(_) => panic!("[env_param] {}: invalid default value \"{}\".", self.env, self.default),
        }
    }

    /// Returns the value of the parameter, reading it from the environment on the first call.
    ///
    /// # Panic
    /// Panics if the default value cannot be parsed.
    pub fn get(&self) -> T
    where
        T: Copy,
    {
        *self.get_ref()
    }

    pub fn get_ref(&self) -> &T {
        let read = || match std::env::var(self.env) {
            Ok(param) => match T::from_str(&param) {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(
                        "could not parse the value \"{}\" of environment variable {}. Using default: \"{}\"",
                        &param,
                        self.env,
                        self.default
                    );
                    self.read_default()
                }
            },
            Err(std::env::VarError::NotPresent) => self.read_default(),
            Err(err) => {
                tracing::warn!("{}: {}. Using default: \"{}\"", self.env, err, self.default);
                self.read_default()
            }
        };
        self.value.get_or_init(read)
    }
}

/// Number of worker threads used for grounding. 0 means: as many as the available parallelism.
pub static THREADS: EnvParam<usize> = EnvParam::new("PDDL2DP_THREADS", "0");

/// Maximal number of atoms in a mutex group.
pub static MAX_GROUP_SIZE: EnvParam<usize> = EnvParam::new("PDDL2DP_MAX_GROUP_SIZE", "64");

/// Maximal number of candidate groups explored when refining a single seed.
pub static MUTEX_REFINEMENTS: EnvParam<usize> = EnvParam::new("PDDL2DP_MUTEX_REFINEMENTS", "256");

/// How atoms are partitioned into state variables.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, clap::ValueEnum, derive_more::Display)]
pub enum EncodingKind {
    /// One boolean variable per ground atom.
    #[display("direct")]
    Direct,
    /// One multi-valued variable per mutex group, boolean variables for the remaining atoms.
    #[default]
    #[display("invariant")]
    Invariant,
}

/// Strength of the reachability analysis used to prune ground actions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, clap::ValueEnum, derive_more::Display)]
pub enum Reachability {
    /// Static preconditions must hold initially, fluent preconditions must be produced by some action schema.
    #[display("static")]
    Static,
    /// Delete-relaxed fixed point over ground atoms.
    #[default]
    #[display("relaxed")]
    Relaxed,
}

#[derive(Clone, Debug)]
pub struct TranslateOptions {
    pub encoding: EncodingKind,
    pub reachability: Reachability,
    /// Number of grounding threads, at least 1.
    pub threads: usize,
    pub max_group_size: usize,
    pub mutex_refinements: usize,
    /// Upper bound on the cost of solutions, declared in the model.
    pub bound: Option<i64>,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        let threads = match THREADS.get() {
            0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            n => n,
        };
        TranslateOptions {
            encoding: EncodingKind::default(),
            reachability: Reachability::default(),
            threads,
            max_group_size: MAX_GROUP_SIZE.get(),
            mutex_refinements: MUTEX_REFINEMENTS.get(),
            bound: None,
        }
    }
}

impl TranslateOptions {
    pub fn with_encoding(mut self, encoding: EncodingKind) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_reachability(mut self, reachability: Reachability) -> Self {
        self.reachability = reachability;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_bound(mut self, bound: Option<i64>) -> Self {
        self.bound = bound;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_param_reads_environment_once() {
        static PARAM: EnvParam<u32> = EnvParam::new("PDDL2DP_TEST_PARAM", "1");
        unsafe { std::env::set_var("PDDL2DP_TEST_PARAM", "7") };
        assert_eq!(PARAM.get(), 7);
        unsafe { std::env::set_var("PDDL2DP_TEST_PARAM", "9") };
        assert_eq!(PARAM.get(), 7);
    }

    #[test]
    fn invalid_values_fall_back_to_default() {
        static PARAM: EnvParam<u32> = EnvParam::new("PDDL2DP_TEST_INVALID", "4");
        unsafe { std::env::set_var("PDDL2DP_TEST_INVALID", "four") };
        assert_eq!(PARAM.get(), 4);
    }

    #[test]
    fn at_least_one_thread() {
        let opts = TranslateOptions::default().with_threads(0);
        assert_eq!(opts.threads, 1);
        assert!(TranslateOptions::default().threads >= 1);
    }
}
