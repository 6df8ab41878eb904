//! Lockfile text: header codec, reconciliation of resolver output, pinned
//! requirement parsing and atomic on-disk replacement.

pub mod header;
pub mod io;
pub mod reconcile;
pub mod requirements;

pub use header::{
    content_hash, read_constraint_digest, read_declared_dependencies, read_python_version,
    ConstraintRecord, LockHeader, PythonVersion, HEADER_TOOL,
};
pub use io::{
    file_content_hash, read_lockfile, remove_lockfile, write_lockfile_atomic, LockFileContents,
};
pub use reconcile::{
    input_label, reconcile_lock, rewrite_constraint_reference, rewrite_input_reference,
    ReconcileRequest,
};
pub use requirements::{
    canonicalize_package_name, parse_pinned_requirements, parse_requirements, LockRequirement,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn reconciled_file_round_trips_through_disk() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("requirements.txt");
        let deps = vec!["hatch".to_string()];
        let raw = "hatch==1.9.1\n    # via -r /tmp/abc/default.in\nclick==8.1.7\n    # via hatch\n";
        let text = reconcile_lock(
            raw,
            &ReconcileRequest {
                env_name: "default",
                python_version: PythonVersion::new(3, 12),
                dependencies: &deps,
                constraint: None,
            },
        );
        write_lockfile_atomic(&path, &text)?;

        let contents = read_lockfile(&path)?;
        let text = contents.text().unwrap_or_default();
        assert_eq!(read_python_version(text)?, PythonVersion::new(3, 12));
        let declared = read_declared_dependencies(text)?;
        assert_eq!(declared, parse_requirements(&["hatch"])?);
        let pinned = parse_pinned_requirements(text)?;
        assert_eq!(pinned.len(), 2);
        assert_eq!(file_content_hash(&path)?, content_hash(fs::read(&path)?.as_slice()));
        Ok(())
    }
}
