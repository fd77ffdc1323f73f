// tests/properties.rs

mod common;
use crate::common::fakes::{FakeBuildFactory, FakeExecutor};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::anyhow;
use proptest::prelude::*;

use composite_build::dag::{ExecutionPlan, NodeKey, Task, TaskRef};
use composite_build::engine::{BuildRegistry, ExecutionResult, RegistryOptions};
use composite_build::exec::AlwaysHealthy;
use composite_build::types::BuildIdentifier;

fn result_of(messages: &[String]) -> ExecutionResult<()> {
    messages
        .iter()
        .fold(ExecutionResult::succeeded(), |acc, msg| {
            acc.with_failures(ExecutionResult::<()>::failed(anyhow!("{msg}")))
        })
}

fn messages_of(result: &ExecutionResult<()>) -> Vec<String> {
    result.failures().iter().map(|f| f.to_string()).collect()
}

fn failure_list() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-z]{1,6}", 0..4)
}

// Task N may only depend on tasks 0..N, which keeps the graph acyclic.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, deps)| {
                    if i == 0 {
                        BTreeSet::new()
                    } else {
                        deps.into_iter().map(|d| d % i).collect()
                    }
                })
                .collect()
        })
    })
}

proptest! {
    #[test]
    fn root_build_sorts_after_every_included_build(names in proptest::collection::vec("[a-z]{1,8}", 1..8)) {
        let mut ids: Vec<BuildIdentifier> =
            names.iter().map(|n| BuildIdentifier::included(n.as_str())).collect();
        ids.push(BuildIdentifier::Root);
        ids.sort();

        prop_assert_eq!(ids.last(), Some(&BuildIdentifier::Root));
        let included: Vec<&str> = ids[..ids.len() - 1].iter().map(|id| id.name()).collect();
        let mut sorted = included.clone();
        sorted.sort();
        prop_assert_eq!(included, sorted);
    }

    #[test]
    fn registry_order_does_not_depend_on_discovery_order(
        names in proptest::collection::btree_set("[a-z]{1,6}", 1..6)
            .prop_map(|set| set.into_iter().collect::<Vec<_>>())
            .prop_shuffle()
    ) {
        let registry = BuildRegistry::new(
            Arc::new(FakeBuildFactory::new(Arc::new(FakeExecutor::new()))),
            Arc::new(AlwaysHealthy),
            RegistryOptions::default(),
        );
        registry.get_controller(&BuildIdentifier::Root).unwrap();
        for name in &names {
            registry.get_controller(&BuildIdentifier::included(name.as_str())).unwrap();
        }

        let mut expected: Vec<BuildIdentifier> =
            names.iter().map(|n| BuildIdentifier::included(n.as_str())).collect();
        expected.sort();
        expected.push(BuildIdentifier::Root);
        prop_assert_eq!(registry.builds(), expected);
    }

    #[test]
    fn merging_results_keeps_failure_order(
        a in failure_list(),
        b in failure_list(),
        c in failure_list(),
    ) {
        let left = result_of(&a).with_failures(result_of(&b)).with_failures(result_of(&c));
        let right = result_of(&a).with_failures(result_of(&b).with_failures(result_of(&c)));

        let expected: Vec<String> = a.iter().chain(&b).chain(&c).cloned().collect();
        prop_assert_eq!(messages_of(&left), expected.clone());
        prop_assert_eq!(messages_of(&right), expected.clone());
        prop_assert_eq!(left.is_success(), expected.is_empty());
    }

    #[test]
    fn plan_order_respects_every_dependency(deps in dag_strategy(12)) {
        let root = BuildIdentifier::Root;
        let mut tasks: Vec<TaskRef> = Vec::with_capacity(deps.len());
        for (i, task_deps) in deps.iter().enumerate() {
            let mut task = Task::new(root.clone(), format!("task_{i}"));
            for &dep in task_deps {
                task = task.depends_on(Arc::clone(&tasks[dep]));
            }
            tasks.push(task.into_ref());
        }

        let mut plan = ExecutionPlan::new(root);
        for task in &tasks {
            plan.add_entry_task(task).unwrap();
        }
        plan.finalize().unwrap();

        let position: HashMap<NodeKey, usize> = plan
            .execution_order()
            .iter()
            .enumerate()
            .map(|(pos, node)| (node.key(), pos))
            .collect();
        prop_assert_eq!(position.len(), tasks.len());

        for (i, task_deps) in deps.iter().enumerate() {
            let dependent = NodeKey::Task(tasks[i].path().clone());
            for &dep in task_deps {
                let dependency = NodeKey::Task(tasks[dep].path().clone());
                prop_assert!(position[&dependency] < position[&dependent]);
            }
        }
    }
}
