use crate::{Value, VarId};
use itertools::Itertools;
use std::fmt::{Display, Formatter};

/// Full assignment of the state variables of a model: the i-th entry is the value of the i-th variable.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct State {
    values: Vec<Value>,
}

impl State {
    pub fn new(values: Vec<Value>) -> Self {
        State { values }
    }

    pub fn num_variables(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, var: VarId) -> Value {
        self.values[usize::from(var)]
    }

    pub fn set(&mut self, var: VarId, value: Value) {
        self.values[usize::from(var)] = value;
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Iterates on all (variable, value) pairs of the state.
    pub fn entries(&self) -> impl Iterator<Item = (VarId, Value)> + '_ {
        self.values.iter().enumerate().map(|(i, &v)| (VarId::from(i), v))
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.values.iter().format(", "))
    }
}
