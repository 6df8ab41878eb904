use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

use super::header::{ConstraintRecord, LockHeader, PythonVersion};

static CONSTRAINT_FLAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-c \S*").expect("constraint pattern compiles"));

/// Inputs for turning raw resolver output into the on-disk lockfile.
#[derive(Clone, Debug)]
pub struct ReconcileRequest<'a> {
    pub env_name: &'a str,
    pub python_version: PythonVersion,
    pub dependencies: &'a [String],
    pub constraint: Option<ConstraintRecord>,
}

/// Stable label that replaces the resolver's temporary `.in` path.
pub fn input_label(env_name: &str) -> String {
    format!("hatch.envs.{env_name}")
}

/// Replace `-r <tmp>/<env>.in` references with the environment label.
///
/// Both `/` and `\` separators are accepted so output produced on either
/// platform canonicalizes identically.
pub fn rewrite_input_reference(body: &str, env_name: &str) -> String {
    let pattern = format!(r"-r \S*[\\/]{}\.in", regex::escape(env_name));
    let Ok(re) = Regex::new(&pattern) else {
        return body.to_string();
    };
    re.replace_all(body, NoExpand(&input_label(env_name)))
        .into_owned()
}

/// Point every `-c <path>` reference at the portable constraint path.
pub fn rewrite_constraint_reference(body: &str, relative_path: &str) -> String {
    let replacement = format!("-c {relative_path}");
    CONSTRAINT_FLAG
        .replace_all(body, NoExpand(&replacement))
        .into_owned()
}

/// Produce the final lockfile text: header, blank line, rewritten body.
pub fn reconcile_lock(raw: &str, request: &ReconcileRequest<'_>) -> String {
    let mut body = rewrite_input_reference(raw, request.env_name);
    if let Some(constraint) = &request.constraint {
        body = rewrite_constraint_reference(&body, &constraint.path);
    }
    let header = LockHeader {
        python_version: request.python_version,
        constraint: request.constraint.clone(),
        dependencies: request.dependencies.to_vec(),
    };
    let mut text = header.render();
    text.push('\n');
    text.push_str(&body);
    text
}
