//! Wave Planner (spec §4.C).
//!
//! Kahn's topological-sort-with-layering: repeatedly peel off every task
//! with zero remaining in-degree into one wave, decrement dependents, and
//! repeat until the in-degree map is empty.

use std::collections::HashMap;

use conductor_kernel::{GroupInfo, KernelError, Task, Wave};
use error_stack::Report;

use conductor_kernel::error::KernelResult;

use crate::graph::{self, DependencyGraph, validate_file_overlaps};

/// Best-effort numeric key parsed from a task `Number`, used only for
/// wave-internal presentation ordering (spec §4.C step 4, spec §9
/// ambiguity note — never a correctness property). Tries a whole-string
/// integer parse first, then falls back to the first integer found among
/// whitespace-separated fields; an unparseable number sorts last.
pub fn parse_sort_key(number: &str) -> u64 {
    if let Ok(n) = number.parse::<u64>() {
        return n;
    }
    for field in number.split_whitespace() {
        if let Ok(n) = field.parse::<u64>() {
            return n;
        }
        let digits: String = field.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            if let Ok(n) = digits.parse::<u64>() {
                return n;
            }
        }
    }
    u64::MAX
}

/// Partitions `tasks` into topologically-ordered waves, validating
/// up-front and checking file overlaps once every wave is built
/// (spec §4.C steps 1-7).
pub fn plan_waves(
    tasks: &[Task],
    max_concurrency: Option<usize>,
    logger: Option<&dyn conductor_kernel::Logger>,
) -> KernelResult<Vec<Wave>> {
    graph::validate(tasks)?;

    let dep_graph = DependencyGraph::build(tasks);
    if dep_graph.has_cycle() {
        return Err(Report::new(KernelError::Graph(
            "dependency graph contains a cycle".to_string(),
        )));
    }

    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let mut in_degree: HashMap<String, usize> = dep_graph.in_degree.clone();
    let mut waves = Vec::new();
    let mut wave_index = 1usize;

    while !in_degree.is_empty() {
        let mut current_wave: Vec<String> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(k, _)| k.clone())
            .collect();

        if current_wave.is_empty() {
            return Err(Report::new(KernelError::Graph(
                "graph inconsistency: no zero-in-degree task remains but tasks are unresolved"
                    .to_string(),
            )));
        }

        current_wave.sort_by_key(|n| (parse_sort_key(n), n.clone()));

        let mut group_info = GroupInfo::default();
        for number in &current_wave {
            if let Some(task) = dep_graph.tasks.get(number) {
                if let Some(group) = &task.worktree_group {
                    group_info
                        .groups
                        .entry(group.clone())
                        .or_default()
                        .push(number.clone());
                }
            }
        }

        let mut wave = Wave::new(wave_index, current_wave.clone());
        if let Some(mc) = max_concurrency {
            wave.max_concurrency = mc;
        }
        if !group_info.groups.is_empty() {
            wave.group_info = Some(group_info);
        }
        waves.push(wave);

        for number in &current_wave {
            if let Some(dependents) = dep_graph.adjacency.get(number) {
                for dependent in dependents {
                    if let Some(deg) = in_degree.get_mut(dependent) {
                        *deg = deg.saturating_sub(1);
                    }
                }
            }
            in_degree.remove(number);
        }

        wave_index += 1;
    }

    validate_file_overlaps(&waves, &dep_graph.tasks, logger)?;

    Ok(waves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_kernel::Task;

    fn task(n: &str, deps: &[&str]) -> Task {
        Task::new(n, n).depends_on(deps.iter().map(|s| s.to_string()))
    }

    #[test]
    fn empty_input_yields_empty_waves() {
        let waves = plan_waves(&[], None, None).unwrap();
        assert!(waves.is_empty());
    }

    #[test]
    fn single_task_no_deps_yields_one_wave_of_one() {
        let waves = plan_waves(&[task("1", &[])], None, None).unwrap();
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].task_numbers, vec!["1".to_string()]);
    }

    #[test]
    fn linear_chain_yields_three_waves() {
        let tasks = vec![task("1", &[]), task("2", &["1"]), task("3", &["2"])];
        let waves = plan_waves(&tasks, None, None).unwrap();
        let numbers: Vec<Vec<String>> = waves.iter().map(|w| w.task_numbers.clone()).collect();
        assert_eq!(
            numbers,
            vec![vec!["1".to_string()], vec!["2".to_string()], vec!["3".to_string()]]
        );
    }

    #[test]
    fn diamond_yields_concurrent_middle_wave() {
        let tasks = vec![
            task("1", &[]),
            task("2", &["1"]),
            task("3", &["1"]),
            task("4", &["2", "3"]),
        ];
        let waves = plan_waves(&tasks, None, None).unwrap();
        let numbers: Vec<Vec<String>> = waves.iter().map(|w| w.task_numbers.clone()).collect();
        assert_eq!(
            numbers,
            vec![
                vec!["1".to_string()],
                vec!["2".to_string(), "3".to_string()],
                vec!["4".to_string()],
            ]
        );
    }

    #[test]
    fn self_dependency_is_a_cycle_error() {
        let tasks = vec![task("1", &["1"])];
        assert!(plan_waves(&tasks, None, None).is_err());
    }

    #[test]
    fn duplicate_number_is_a_validation_error() {
        let tasks = vec![task("1", &[]), task("1", &[])];
        assert!(plan_waves(&tasks, None, None).is_err());
    }

    #[test]
    fn file_conflict_within_a_wave_is_fatal() {
        let tasks = vec![
            task("1", &[]).with_files(["a.go"]),
            task("2", &[]).with_files(["a.go"]),
        ];
        let result = plan_waves(&tasks, None, None);
        assert!(result.is_err());
    }

    #[test]
    fn max_concurrency_override_applies_to_every_wave() {
        let tasks = vec![task("1", &[])];
        let waves = plan_waves(&tasks, Some(3), None).unwrap();
        assert_eq!(waves[0].max_concurrency, 3);
    }

    #[test]
    fn wave_internal_sort_is_numeric_not_lexicographic() {
        let tasks = vec![task("10", &[]), task("2", &[]), task("1", &[])];
        let waves = plan_waves(&tasks, None, None).unwrap();
        assert_eq!(waves[0].task_numbers, vec!["1", "2", "10"]);
    }

    #[test]
    fn unparseable_number_sorts_last() {
        let tasks = vec![task("abc", &[]), task("1", &[])];
        let waves = plan_waves(&tasks, None, None).unwrap();
        assert_eq!(waves[0].task_numbers, vec!["1", "abc"]);
    }

    #[test]
    fn parse_sort_key_falls_back_to_first_integer_field() {
        assert_eq!(parse_sort_key("task 7 alpha"), 7);
        assert_eq!(parse_sort_key("42"), 42);
        assert_eq!(parse_sort_key("nope"), u64::MAX);
    }

    #[test]
    fn worktree_group_bucketing() {
        let tasks = vec![
            task("1", &[]).with_worktree_group("frontend"),
            task("2", &[]).with_worktree_group("backend"),
        ];
        let waves = plan_waves(&tasks, None, None).unwrap();
        let group_info = waves[0].group_info.as_ref().unwrap();
        assert_eq!(group_info.groups["frontend"], vec!["1".to_string()]);
        assert_eq!(group_info.groups["backend"], vec!["2".to_string()]);
    }
}
