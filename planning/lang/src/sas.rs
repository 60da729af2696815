//! Parser for the SAS+ (finite-domain) task format, as produced by the Fast Downward translator.
//!
//! The format is line based: each section is delimited by `begin_XXX` and `end_XXX` lines,
//! and the lines holding the number of sections (variables, operators, ...) are ignored.

use crate::errors::*;
use crate::input::Input;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// An assignment `var = value` of a SAS+ variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SasFact {
    pub var: usize,
    pub value: usize,
}

impl Display for SasFact {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "var{}={}", self.var, self.value)
    }
}

#[derive(Clone, Debug)]
pub struct SasVariable {
    pub name: String,
    /// Layer of a derived variable, -1 for a regular state variable.
    pub axiom_layer: i32,
    /// Label of each value, e.g. `Atom on(a, b)` or `<none of those>`
    pub values: Vec<String>,
}

/// Effect of an operator: `var` goes from `pre` (any value if `None`) to `post`,
/// provided that all `conditions` hold.
#[derive(Clone, Debug)]
pub struct SasEffect {
    pub conditions: Vec<SasFact>,
    pub var: usize,
    pub pre: Option<usize>,
    pub post: usize,
}

#[derive(Clone, Debug)]
pub struct SasOperator {
    pub name: String,
    pub prevail: Vec<SasFact>,
    pub effects: Vec<SasEffect>,
    pub cost: i64,
    pub span: Span,
}

/// A rule deriving the value of an axiom variable.
#[derive(Clone, Debug)]
pub struct SasAxiom {
    pub conditions: Vec<SasFact>,
    pub var: usize,
    pub pre: Option<usize>,
    pub post: usize,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct SasTask {
    pub version: Option<u32>,
    /// True if operator costs are meaningful (action costs in the original problem).
    pub metric: bool,
    pub variables: Vec<SasVariable>,
    /// Initial value of each variable.
    pub initial: Vec<usize>,
    pub goal: Vec<SasFact>,
    pub operators: Vec<SasOperator>,
    pub axioms: Vec<SasAxiom>,
}

#[derive(Clone)]
struct Line<'a> {
    text: &'a str,
    span: Span,
}

impl Line<'_> {
    fn invalid(&self, msg: impl ToString) -> Message {
        self.span.invalid(msg)
    }

    fn parse<T: FromStr>(&self, what: &str) -> Res<T> {
        self.text.trim().parse().map_err(|_| self.invalid(format!("expected {what}")))
    }

    /// All whitespace-separated integers of the line.
    fn ints(&self) -> Res<Vec<i64>> {
        self.text
            .split_whitespace()
            .map(|p| p.parse().map_err(|_| self.invalid(format!("`{p}` is not an integer"))))
            .collect()
    }
}

struct Lines<'a> {
    input: &'a Input,
    lines: std::vec::IntoIter<(usize, &'a str)>,
}

impl<'a> Lines<'a> {
    fn new(input: &'a Input) -> Self {
        let text = input.text();
        let mut lines = Vec::new();
        let mut offset = 0;
        for l in text.split_inclusive('\n') {
            lines.push((offset, l.trim_end_matches(['\n', '\r'])));
            offset += l.len();
        }
        Lines {
            input,
            lines: lines.into_iter(),
        }
    }

    fn next(&mut self) -> Option<Line<'a>> {
        let (start, text) = self.lines.next()?;
        let end = start + text.len();
        Some(Line {
            text,
            span: Span::with_range(self.input.clone(), start..end),
        })
    }

    fn line(&mut self) -> Res<Line<'a>> {
        let end = self.input.text().len();
        self.next()
            .ok_or_else(|| Span::with_range(self.input.clone(), end..end).invalid("Unexpected end of input"))
    }

    fn expect(&mut self, keyword: &str) -> Res<()> {
        let l = self.line()?;
        if l.text.trim() == keyword {
            Ok(())
        } else {
            Err(l.invalid(format!("expected `{keyword}`")))
        }
    }

    fn int<T: FromStr>(&mut self, what: &str) -> Res<T> {
        self.line()?.parse(what)
    }
}

/// Checks that `(var, value)` refers to a declared variable and to a value of its domain.
fn fact(variables: &[SasVariable], var: i64, value: i64, line: &Line) -> Res<SasFact> {
    let decl = usize::try_from(var)
        .ok()
        .and_then(|v| variables.get(v))
        .ok_or_else(|| line.invalid(format!("unknown variable {var}")))?;
    if value < 0 || value as usize >= decl.values.len() {
        return Err(line.invalid(format!("value {value} is outside the domain of {}", decl.name)));
    }
    Ok(SasFact {
        var: var as usize,
        value: value as usize,
    })
}

fn read_facts(lines: &mut Lines, variables: &[SasVariable]) -> Res<Vec<SasFact>> {
    let n: usize = lines.int("number of facts")?;
    let mut facts = Vec::new();
    for _ in 0..n {
        let l = lines.line()?;
        let vals = l.ints()?;
        let [var, value] = vals[..] else {
            return Err(l.invalid("expected `var value`"));
        };
        facts.push(fact(variables, var, value, &l)?);
    }
    Ok(facts)
}

/// Parses the line `var pre post` closing an effect or an axiom, where `pre` may be -1.
fn read_transition(variables: &[SasVariable], vals: &[i64], l: &Line) -> Res<(usize, Option<usize>, usize)> {
    let [var, pre, post] = vals else {
        return Err(l.invalid("expected `var pre post`"));
    };
    let post = fact(variables, *var, *post, l)?;
    let pre = if *pre == -1 {
        None
    } else {
        Some(fact(variables, *var, *pre, l)?.value)
    };
    Ok((post.var, pre, post.value))
}

fn read_cost(l: &Line) -> Res<i64> {
    let text = l.text.trim();
    if let Ok(c) = text.parse::<i64>() {
        return Ok(c);
    }
    match text.parse::<f64>() {
        Ok(c) if c.fract() == 0.0 => Ok(c as i64),
        _ => Err(l.invalid("operator costs must be integers")),
    }
}

pub fn parse_sas(input: Input) -> Res<SasTask> {
    read_sas(&input).title("Invalid SAS+ task")
}

fn read_sas(input: &Input) -> Res<SasTask> {
    let mut lines = Lines::new(input);
    let mut task = SasTask {
        version: None,
        metric: false,
        variables: Vec::new(),
        initial: Vec::new(),
        goal: Vec::new(),
        operators: Vec::new(),
        axioms: Vec::new(),
    };
    let mut seen_state = false;

    while let Some(line) = lines.next() {
        match line.text.trim() {
            "" => {}
            "begin_version" => {
                task.version = Some(lines.int("version number")?);
                lines.expect("end_version")?;
            }
            "begin_metric" => {
                let m: u32 = lines.int("0 or 1")?;
                task.metric = m != 0;
                lines.expect("end_metric")?;
            }
            "begin_variable" => {
                let name_line = lines.line()?;
                let name = name_line.text.trim().to_string();
                let expected = format!("var{}", task.variables.len());
                if name != expected {
                    return Err(name_line.invalid(format!("expected variable name `{expected}`")));
                }
                let axiom_layer = lines.int("axiom layer")?;
                let n: usize = lines.int("domain size")?;
                let mut values = Vec::new();
                for _ in 0..n {
                    values.push(lines.line()?.text.to_string());
                }
                lines.expect("end_variable")?;
                task.variables.push(SasVariable {
                    name,
                    axiom_layer,
                    values,
                });
            }
            "begin_mutex_group" => {
                // redundant with the variables: skipped
                let n: usize = lines.int("number of facts")?;
                for _ in 0..n {
                    lines.line()?;
                }
                lines.expect("end_mutex_group")?;
            }
            "begin_state" => {
                for var in 0..task.variables.len() {
                    let l = lines.line()?;
                    let value: i64 = l.parse("initial value")?;
                    task.initial.push(fact(&task.variables, var as i64, value, &l)?.value);
                }
                lines.expect("end_state")?;
                seen_state = true;
            }
            "begin_goal" => {
                task.goal = read_facts(&mut lines, &task.variables)?;
                lines.expect("end_goal")?;
            }
            "begin_operator" => {
                let name = lines.line()?.text.trim().to_string();
                let prevail = read_facts(&mut lines, &task.variables)?;
                let n: usize = lines.int("number of effects")?;
                let mut effects = Vec::new();
                for _ in 0..n {
                    let l = lines.line()?;
                    let vals = l.ints()?;
                    let num_conds = vals.first().and_then(|&n| usize::try_from(n).ok());
                    let expected_len = num_conds.and_then(|n| n.checked_mul(2)?.checked_add(4));
                    let (Some(num_conds), Some(expected_len)) = (num_conds, expected_len) else {
                        return Err(l.invalid("malformed effect"));
                    };
                    if vals.len() != expected_len {
                        return Err(l.invalid("malformed effect"));
                    }
                    let conditions = (0..num_conds)
                        .map(|i| fact(&task.variables, vals[1 + 2 * i], vals[2 + 2 * i], &l))
                        .collect::<Res<Vec<_>>>()?;
                    let (var, pre, post) = read_transition(&task.variables, &vals[1 + 2 * num_conds..], &l)?;
                    effects.push(SasEffect {
                        conditions,
                        var,
                        pre,
                        post,
                    });
                }
                let cost = read_cost(&lines.line()?)?;
                let end = lines.line()?;
                if end.text.trim() != "end_operator" {
                    return Err(end.invalid("expected `end_operator`"));
                }
                task.operators.push(SasOperator {
                    name,
                    prevail,
                    effects,
                    cost,
                    span: Span::with_range(input.clone(), line.span.range().start..end.span.range().end),
                });
            }
            "begin_rule" => {
                let conditions = read_facts(&mut lines, &task.variables)?;
                let l = lines.line()?;
                let (var, pre, post) = read_transition(&task.variables, &l.ints()?, &l)?;
                let end = lines.line()?;
                if end.text.trim() != "end_rule" {
                    return Err(end.invalid("expected `end_rule`"));
                }
                task.axioms.push(SasAxiom {
                    conditions,
                    var,
                    pre,
                    post,
                    span: Span::with_range(input.clone(), line.span.range().start..end.span.range().end),
                });
            }
            other if other.parse::<usize>().is_ok() => {} // number of elements in the following sections
            _ => return Err(line.invalid("unexpected line")),
        }
    }
    if !seen_state {
        return Err(Message::error("missing initial state (`begin_state` section)"));
    }
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TASK: &str = "begin_version
3
end_version
begin_metric
1
end_metric
2
begin_variable
var0
-1
2
Atom handempty()
NegatedAtom handempty()
end_variable
begin_variable
var1
-1
3
Atom holding(a)
Atom ontable(a)
<none of those>
end_variable
1
begin_mutex_group
2
1 0
1 1
end_mutex_group
begin_state
0
1
end_state
begin_goal
1
1 0
end_goal
1
begin_operator
pick-up a
0
2
0 0 0 1
0 1 1 0
1.0
end_operator
0
";

    #[test]
    fn parse_task() {
        let task = parse_sas(Input::from_string(TASK)).unwrap();
        assert_eq!(task.version, Some(3));
        assert!(task.metric);
        assert_eq!(task.variables.len(), 2);
        assert_eq!(task.variables[1].values[2], "<none of those>");
        assert_eq!(task.initial, vec![0, 1]);
        assert_eq!(task.goal, vec![SasFact { var: 1, value: 0 }]);
        let op = &task.operators[0];
        assert_eq!(op.name, "pick-up a");
        assert!(op.prevail.is_empty());
        assert_eq!(op.effects.len(), 2);
        assert_eq!(op.effects[1].var, 1);
        assert_eq!(op.effects[1].pre, Some(1));
        assert_eq!(op.effects[1].post, 0);
        assert_eq!(op.cost, 1);
        assert!(task.axioms.is_empty());
    }

    #[test]
    fn reject_out_of_domain_values() {
        let broken = TASK.replace("0 1 1 0", "0 1 1 3");
        assert!(parse_sas(Input::from_string(broken)).is_err());
        let broken = TASK.replace("var1\n", "var7\n");
        assert!(parse_sas(Input::from_string(broken)).is_err());
    }

    #[test]
    fn huge_counts_are_errors() {
        let header = "begin_version\n3\nend_version\nbegin_metric\n0\nend_metric\n1\nbegin_variable\nvar0\n-1\n";
        let huge_domain = format!("{header}1000000000000000000\n");
        assert!(parse_sas(Input::from_string(huge_domain)).is_err());

        let huge_goal = TASK.replace("begin_goal\n1\n", "begin_goal\n18446744073709551615\n");
        assert!(parse_sas(Input::from_string(huge_goal)).is_err());

        let huge_effects = TASK.replace("pick-up a\n0\n2\n", "pick-up a\n0\n1000000000000000000\n");
        assert!(parse_sas(Input::from_string(huge_effects)).is_err());

        let huge_conditions = TASK.replace("0 0 0 1\n", "9223372036854775807 0 0 1\n");
        let err = parse_sas(Input::from_string(huge_conditions)).unwrap_err();
        assert!(format!("{err}").contains("malformed effect"));
    }

    #[test]
    fn fractional_costs_are_rejected() {
        let broken = TASK.replace("1.0\nend_operator", "1.5\nend_operator");
        assert!(parse_sas(Input::from_string(broken)).is_err());
    }
}
