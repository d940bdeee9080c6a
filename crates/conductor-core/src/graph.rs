//! Dependency Graph (spec §4.B).

use std::collections::{HashMap, HashSet};

use conductor_kernel::{KernelError, Task, Wave};
use error_stack::{Report, ResultExt};

use conductor_kernel::error::KernelResult;

/// `tasks`, `adjacency` (prerequisite -> dependents), `in_degree`
/// (spec §3). Built once by [`DependencyGraph::build`] and never mutated
/// after wave planning (spec §5).
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub tasks: HashMap<String, Task>,
    pub adjacency: HashMap<String, Vec<String>>,
    pub in_degree: HashMap<String, usize>,
}

/// Fails if any task number is empty, duplicated, or references a
/// non-existent dependency (spec §4.B).
pub fn validate(tasks: &[Task]) -> KernelResult<()> {
    let mut seen = HashSet::new();
    for t in tasks {
        if t.number.is_empty() {
            return Err(Report::new(KernelError::Graph(
                "task has an empty number".to_string(),
            )));
        }
        if !seen.insert(t.number.clone()) {
            return Err(Report::new(KernelError::Graph(format!(
                "duplicate task number: {}",
                t.number
            ))));
        }
    }
    let known: HashSet<&str> = tasks.iter().map(|t| t.number.as_str()).collect();
    for t in tasks {
        for dep in &t.depends_on {
            if !known.contains(dep.as_str()) {
                return Err(Report::new(KernelError::Graph(format!(
                    "task {} depends on unknown task {dep}",
                    t.number
                ))))
                .attach(format!("validating dependencies of task {}", t.number));
            }
        }
    }
    Ok(())
}

impl DependencyGraph {
    /// Constructs adjacency and in-degree maps, silently ignoring
    /// dependency edges to unknown tasks — [`validate`] is expected to have
    /// run first (spec §4.B).
    pub fn build(tasks: &[Task]) -> Self {
        let mut graph = DependencyGraph::default();
        for t in tasks {
            graph.tasks.insert(t.number.clone(), t.clone());
            graph.adjacency.entry(t.number.clone()).or_default();
            graph.in_degree.entry(t.number.clone()).or_insert(0);
        }

        let known: HashSet<String> = graph.tasks.keys().cloned().collect();
        for t in tasks {
            for dep in &t.depends_on {
                if !known.contains(dep) {
                    continue;
                }
                graph.adjacency.entry(dep.clone()).or_default().push(t.number.clone());
                *graph.in_degree.entry(t.number.clone()).or_insert(0) += 1;
            }
        }
        graph
    }

    /// Tri-colour DFS cycle detection: a back-edge to an in-progress node
    /// is a cycle; a self-loop is a cycle (spec §4.B).
    pub fn has_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: HashMap<&str, Color> =
            self.tasks.keys().map(|k| (k.as_str(), Color::White)).collect();

        fn visit<'a>(
            node: &'a str,
            adjacency: &'a HashMap<String, Vec<String>>,
            color: &mut HashMap<&'a str, Color>,
        ) -> bool {
            color.insert(node, Color::Gray);
            if let Some(deps) = adjacency.get(node) {
                for next in deps {
                    match color.get(next.as_str()).copied().unwrap_or(Color::White) {
                        Color::Gray => return true,
                        Color::White => {
                            if visit(next.as_str(), adjacency, color) {
                                return true;
                            }
                        }
                        Color::Black => {}
                    }
                }
            }
            color.insert(node, Color::Black);
            false
        }

        let keys: Vec<String> = self.tasks.keys().cloned().collect();
        for key in &keys {
            if color.get(key.as_str()).copied().unwrap_or(Color::White) == Color::White
                && visit(key.as_str(), &self.adjacency, &mut color)
            {
                return true;
            }
        }
        false
    }
}

/// Canonicalise a declared file path for overlap comparison: collapse
/// `./` segments and repeated slashes without touching the filesystem
/// (tasks may name files that don't exist yet).
fn normalise_path(path: &str) -> String {
    let mut parts = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// For each wave: if any task declares no `Files`, warn and skip overlap
/// checking for that wave (avoids false positives from metadata gaps).
/// Otherwise a second task in the same wave claiming an already-owned
/// normalised path is a fatal error naming both tasks (spec §4.B).
pub fn validate_file_overlaps(
    waves: &[Wave],
    tasks: &HashMap<String, Task>,
    logger: Option<&dyn conductor_kernel::Logger>,
) -> KernelResult<()> {
    for wave in waves {
        let wave_tasks: Vec<&Task> = wave
            .task_numbers
            .iter()
            .filter_map(|n| tasks.get(n))
            .collect();

        if wave_tasks.iter().any(|t| t.files.is_empty()) {
            conductor_kernel::logging::log_warn(
                logger,
                format!(
                    "{}: at least one task declares no Files; skipping overlap check",
                    wave.name
                ),
            );
            continue;
        }

        let mut owner: HashMap<String, &str> = HashMap::new();
        for t in &wave_tasks {
            for file in &t.files {
                let normalised = normalise_path(file);
                if let Some(existing) = owner.get(&normalised) {
                    return Err(Report::new(KernelError::FileOverlap {
                        a: (*existing).to_string(),
                        b: t.number.clone(),
                        path: normalised,
                    }));
                }
                owner.insert(normalised, t.number.as_str());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_kernel::Task;

    fn task(n: &str, deps: &[&str]) -> Task {
        Task::new(n, n).depends_on(deps.iter().map(|s| s.to_string()))
    }

    #[test]
    fn validate_rejects_empty_number() {
        let t = Task::new("", "x");
        assert!(validate(&[t]).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_number() {
        let tasks = vec![task("1", &[]), task("1", &[])];
        assert!(validate(&tasks).is_err());
    }

    #[test]
    fn validate_rejects_dangling_dependency() {
        let tasks = vec![task("1", &["99"])];
        assert!(validate(&tasks).is_err());
    }

    #[test]
    fn validate_accepts_well_formed_tasks() {
        let tasks = vec![task("1", &[]), task("2", &["1"])];
        assert!(validate(&tasks).is_ok());
    }

    #[test]
    fn build_drops_unknown_dependency_edges_silently() {
        let tasks = vec![task("1", &["missing"])];
        let graph = DependencyGraph::build(&tasks);
        assert_eq!(graph.in_degree["1"], 0);
    }

    #[test]
    fn has_cycle_detects_self_loop() {
        let tasks = vec![task("1", &["1"])];
        let graph = DependencyGraph::build(&tasks);
        assert!(graph.has_cycle());
    }

    #[test]
    fn has_cycle_detects_longer_cycle() {
        let tasks = vec![task("1", &["2"]), task("2", &["1"])];
        let graph = DependencyGraph::build(&tasks);
        assert!(graph.has_cycle());
    }

    #[test]
    fn has_cycle_false_for_diamond() {
        let tasks = vec![
            task("1", &[]),
            task("2", &["1"]),
            task("3", &["1"]),
            task("4", &["2", "3"]),
        ];
        let graph = DependencyGraph::build(&tasks);
        assert!(!graph.has_cycle());
    }

    #[test]
    fn file_overlap_detected_within_same_wave() {
        let mut tasks = HashMap::new();
        tasks.insert("1".to_string(), task("1", &[]).with_files(["a.rs"]));
        tasks.insert("2".to_string(), task("2", &[]).with_files(["a.rs"]));
        let waves = vec![Wave::new(1, vec!["1".into(), "2".into()])];
        let result = validate_file_overlaps(&waves, &tasks, None);
        assert!(result.is_err());
    }

    #[test]
    fn file_overlap_allowed_across_waves() {
        let mut tasks = HashMap::new();
        tasks.insert("1".to_string(), task("1", &[]).with_files(["a.rs"]));
        tasks.insert("2".to_string(), task("2", &["1"]).with_files(["a.rs"]));
        let waves = vec![
            Wave::new(1, vec!["1".into()]),
            Wave::new(2, vec!["2".into()]),
        ];
        assert!(validate_file_overlaps(&waves, &tasks, None).is_ok());
    }

    #[test]
    fn file_overlap_skipped_when_files_metadata_missing() {
        let mut tasks = HashMap::new();
        tasks.insert("1".to_string(), task("1", &[]));
        tasks.insert("2".to_string(), task("2", &[]));
        let waves = vec![Wave::new(1, vec!["1".into(), "2".into()])];
        assert!(validate_file_overlaps(&waves, &tasks, None).is_ok());
    }

    #[test]
    fn normalise_path_collapses_dot_segments() {
        assert_eq!(normalise_path("./a/../b/c"), "b/c");
        assert_eq!(normalise_path("a//b"), "a/b");
    }
}
