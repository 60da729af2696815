//! Locates the domain file of a PDDL problem based on usual naming conventions.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::errors::{Ctx, Message, Res};

/// Attempts to find the domain file of the given PDDL problem.
///
/// Looks, in the directory of the problem and in its parent, for a file named:
///  - `domain.pddl`
///  - `XXX.dom.pddl` if the problem is `XXX.pb.pddl` or `XXX.YY.pb.pddl`
///  - `XXX-domain.pddl` or `domain-XXX.pddl` if the problem is `XXX.pddl`
///  - `domain-NN.pddl` if the problem is `instance-NN.pddl`
pub fn find_domain_of(problem_file: &Path) -> Res<PathBuf> {
    let mut candidate_domain_files: Vec<PathBuf> = Vec::with_capacity(4);

    candidate_domain_files.push(match problem_file.extension() {
        Some(ext) => Path::new("domain").with_extension(ext),
        None => Path::new("domain.pddl").to_path_buf(),
    });

    let problem_filename = problem_file
        .file_name()
        .title("Invalid file")?
        .to_str()
        .title("Could not convert file name to utf8")?;

    let re = Regex::new("^(.+)(\\.[^\\.]+)\\.pb\\.pddl$")?;
    for m in re.captures_iter(problem_filename) {
        candidate_domain_files.push(format!("{}.dom.pddl", &m[1]).into());
    }
    let re = Regex::new("^(.+)\\.pb\\.pddl$")?;
    for m in re.captures_iter(problem_filename) {
        candidate_domain_files.push(format!("{}.dom.pddl", &m[1]).into());
    }
    let re = Regex::new("^(.+)\\.pddl$")?;
    for m in re.captures_iter(problem_filename) {
        candidate_domain_files.push(format!("{}-domain.pddl", &m[1]).into());
        candidate_domain_files.push(format!("domain-{}.pddl", &m[1]).into());
    }
    let re = Regex::new("^instance-([1-9][0-9]*)\\.pddl$")?;
    for m in re.captures_iter(problem_filename) {
        candidate_domain_files.push(format!("domain-{}.pddl", &m[1]).into());
    }

    let mut candidate_directories = Vec::with_capacity(3);
    if let Some(curr) = problem_file.parent() {
        candidate_directories.push(curr.to_owned());
        if let Some(parent) = curr.parent() {
            candidate_directories.push(parent.to_owned());
            candidate_directories.push(parent.join("domains"));
        }
    }

    for f in &candidate_domain_files {
        for dir in &candidate_directories {
            let candidate = dir.join(f);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }
    Err(Message::error(format!(
        "Could not find a domain file in the same or parent directory as the problem file. Candidates: {candidate_domain_files:?}"
    )))
}
