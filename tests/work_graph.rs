// tests/work_graph.rs

mod common;
use crate::common::fakes::{FakeExecutor, FakeModelController, task};
use crate::common::{included, init_tracing, lifecycle_for};

use std::error::Error;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use composite_build::dag::{ExecutionPlan, Node, NodeKey, SyntheticNode, Task, TaskRef};
use composite_build::errors::CompositeError;
use composite_build::phase::BuildPhase;
use composite_build::types::BuildIdentifier;

type TestResult = Result<(), Box<dyn Error>>;

fn key(task: &TaskRef) -> NodeKey {
    NodeKey::Task(task.path().clone())
}

fn position(order: &[NodeKey], key: &NodeKey) -> usize {
    order
        .iter()
        .position(|k| k == key)
        .unwrap_or_else(|| panic!("{key} missing from execution order"))
}

fn order_of(plan: &ExecutionPlan) -> Vec<NodeKey> {
    plan.execution_order().iter().map(|node| node.key()).collect()
}

#[test]
fn entry_task_pulls_in_dependencies_in_order() -> TestResult {
    init_tracing();
    let root = BuildIdentifier::Root;
    let compile = task(&root, "compile");
    let test = Task::new(root.clone(), "test")
        .depends_on(Arc::clone(&compile))
        .into_ref();
    let check = Task::new(root.clone(), "check")
        .depends_on(Arc::clone(&test))
        .depends_on(Arc::clone(&compile))
        .into_ref();

    let mut plan = ExecutionPlan::new(root);
    assert!(plan.add_entry_task(&check)?);
    assert!(!plan.add_entry_task(&check)?);
    plan.finalize()?;

    let order = order_of(&plan);
    assert_eq!(order.len(), 3);
    assert!(position(&order, &key(&compile)) < position(&order, &key(&test)));
    assert!(position(&order, &key(&test)) < position(&order, &key(&check)));
    assert_eq!(plan.entry_tasks(), &[key(&check)]);
    assert_eq!(
        plan.dependencies_of(&key(&check)),
        vec![key(&compile), key(&test)]
    );
    Ok(())
}

#[test]
fn foreign_dependency_becomes_external_node_and_cross_build_request() -> TestResult {
    init_tracing();
    let lib = included("lib");
    let jar = task(&lib, "jar");
    let assemble = Task::new(BuildIdentifier::Root, "assemble")
        .depends_on(Arc::clone(&jar))
        .into_ref();
    let dist = Task::new(BuildIdentifier::Root, "dist")
        .depends_on(Arc::clone(&jar))
        .into_ref();

    let mut plan = ExecutionPlan::new(BuildIdentifier::Root);
    plan.add_entry_task(&assemble)?;
    plan.add_entry_task(&dist)?;

    let requests = plan.take_cross_build_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path(), jar.path());
    assert!(plan.take_cross_build_requests().is_empty());

    plan.finalize()?;
    let externals: Vec<_> = plan
        .execution_order()
        .into_iter()
        .filter(|node| matches!(node, Node::External(_)))
        .map(|node| node.key())
        .collect();
    assert_eq!(externals, vec![key(&jar)]);
    Ok(())
}

#[test]
fn synthetic_node_with_unknown_dependency_is_rejected() {
    init_tracing();
    let mut plan = ExecutionPlan::new(BuildIdentifier::Root);
    let barrier = SyntheticNode::new("barrier").after(NodeKey::Synthetic("missing".into()));

    let result = plan.add_nodes(vec![Node::Synthetic(barrier)]);

    assert!(matches!(result, Err(CompositeError::InvalidWorkGraph(_))));
}

#[test]
fn synthetic_barrier_runs_after_its_dependencies() -> TestResult {
    init_tracing();
    let root = BuildIdentifier::Root;
    let compile = task(&root, "compile");
    let mut plan = ExecutionPlan::new(root);
    plan.add_entry_task(&compile)?;
    plan.add_nodes(vec![Node::Synthetic(
        SyntheticNode::new("barrier").after(key(&compile)),
    )])?;
    plan.finalize()?;

    let order = order_of(&plan);
    let barrier = NodeKey::Synthetic("barrier".into());
    assert!(position(&order, &key(&compile)) < position(&order, &barrier));
    Ok(())
}

#[test]
fn finalized_plan_rejects_changes() -> TestResult {
    init_tracing();
    let root = BuildIdentifier::Root;
    let mut plan = ExecutionPlan::new(root.clone());
    plan.add_entry_task(&task(&root, "a"))?;
    plan.finalize()?;

    let result = plan.add_entry_task(&task(&root, "b"));
    assert!(matches!(result, Err(CompositeError::IllegalPhase { .. })));
    Ok(())
}

#[test]
fn explicit_dependency_cycle_fails_finalize() -> TestResult {
    init_tracing();
    let root = BuildIdentifier::Root;
    let a = task(&root, "a");
    let b = Task::new(root.clone(), "b").depends_on(Arc::clone(&a)).into_ref();
    let mut plan = ExecutionPlan::new(root);
    plan.add_entry_task(&b)?;
    plan.add_dependency(&key(&a), &key(&b))?;

    match plan.finalize() {
        Err(CompositeError::InvalidWorkGraph(msg)) => assert!(msg.contains("cycle detected")),
        other => panic!("expected InvalidWorkGraph, got {other:?}"),
    }
    assert!(!plan.is_finalized());
    Ok(())
}

#[test]
fn work_graph_requires_task_schedule_phase() {
    init_tracing();
    let lifecycle = lifecycle_for(
        FakeModelController::new(BuildIdentifier::Root),
        Arc::new(FakeExecutor::new()),
    );

    let result = lifecycle.new_work_graph();

    assert!(matches!(result, Err(CompositeError::IllegalPhase { .. })));
}

#[test]
fn new_work_graph_runs_seeding_hook() -> TestResult {
    init_tracing();
    let model =
        FakeModelController::new(BuildIdentifier::Root).seeding(SyntheticNode::new("lifecycle"));
    let lifecycle = lifecycle_for(model, Arc::new(FakeExecutor::new()));

    lifecycle.prepare_to_schedule_tasks()?;
    let graph = lifecycle.new_work_graph()?;

    assert!(graph.plan().contains(&NodeKey::Synthetic("lifecycle".into())));
    assert_eq!(graph.build(), &BuildIdentifier::Root);
    Ok(())
}

#[test]
fn population_is_repeatable_until_finalize() -> TestResult {
    init_tracing();
    let root = BuildIdentifier::Root;
    let compile = task(&root, "compile");
    let model = FakeModelController::new(root.clone()).requesting(Arc::clone(&compile));
    let lifecycle = lifecycle_for(model, Arc::new(FakeExecutor::new()));

    lifecycle.prepare_to_schedule_tasks()?;
    let mut graph = lifecycle.new_work_graph()?;
    lifecycle.populate_work_graph(&mut graph, |builder| builder.add_requested_tasks())?;
    let docs = task(&root, "docs");
    lifecycle.populate_work_graph(&mut graph, |builder| {
        builder.add_entry_tasks(std::slice::from_ref(&docs))?;
        builder.add_nodes(vec![Node::Synthetic(
            SyntheticNode::new("barrier").after(key(&docs)),
        )])
    })?;
    lifecycle.finalize_work_graph(&mut graph)?;

    assert_eq!(lifecycle.phase(), BuildPhase::ReadyToRun);
    assert_eq!(graph.plan().len(), 3);
    assert_eq!(graph.plan().entry_tasks(), &[key(&compile), key(&docs)]);

    let late = lifecycle.populate_work_graph(&mut graph, |builder| {
        builder.add_entry_tasks(&[task(&root, "late")])
    });
    assert!(matches!(late, Err(CompositeError::IllegalPhase { .. })));
    Ok(())
}

#[test]
fn cycle_fails_finalize_and_keeps_task_schedule() -> TestResult {
    init_tracing();
    let root = BuildIdentifier::Root;
    // Two inconsistent definitions of ":x": the graph ends up with x -> y -> x.
    let bare_x = task(&root, "x");
    let y = Task::new(root.clone(), "y").depends_on(bare_x).into_ref();
    let x = Task::new(root.clone(), "x").depends_on(y).into_ref();

    let lifecycle = lifecycle_for(FakeModelController::new(root), Arc::new(FakeExecutor::new()));
    lifecycle.prepare_to_schedule_tasks()?;
    let mut graph = lifecycle.new_work_graph()?;
    lifecycle.populate_work_graph(&mut graph, |builder| {
        builder.add_entry_tasks(std::slice::from_ref(&x))
    })?;

    match lifecycle.finalize_work_graph(&mut graph) {
        Err(CompositeError::Failed(failure)) => {
            assert!(matches!(
                failure.downcast_ref::<CompositeError>(),
                Some(CompositeError::InvalidWorkGraph(_))
            ));
        }
        other => panic!("expected a failed finalize, got {other:?}"),
    }
    assert_eq!(lifecycle.phase(), BuildPhase::TaskSchedule);
    assert_eq!(lifecycle.failures().len(), 1);
    Ok(())
}

#[test]
fn completion_handlers_see_every_completed_task() -> TestResult {
    init_tracing();
    let root = BuildIdentifier::Root;
    let compile = task(&root, "compile");
    let test = Task::new(root.clone(), "test")
        .depends_on(Arc::clone(&compile))
        .into_ref();
    let model = FakeModelController::new(root).requesting(test);
    let lifecycle = lifecycle_for(model, Arc::new(FakeExecutor::new()));

    lifecycle.prepare_to_schedule_tasks()?;
    let mut graph = lifecycle.new_work_graph()?;
    lifecycle.populate_work_graph(&mut graph, |builder| builder.add_requested_tasks())?;

    let completed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&completed);
    graph.on_complete(move |task| sink.lock().unwrap().push(task.name().to_string()))?;
    lifecycle.finalize_work_graph(&mut graph)?;

    let late = graph.on_complete(|_| {});
    assert!(matches!(late, Err(CompositeError::IllegalPhase { .. })));

    let result = lifecycle.execute_tasks(&graph)?;
    assert!(result.is_success());
    assert_eq!(*completed.lock().unwrap(), vec!["compile", "test"]);
    assert_eq!(lifecycle.phase(), BuildPhase::Configure);
    Ok(())
}

#[test]
fn graph_of_another_lifecycle_is_rejected() -> TestResult {
    init_tracing();
    let executor = Arc::new(FakeExecutor::new());
    let first = lifecycle_for(FakeModelController::new(included("a")), executor.clone());
    let second = lifecycle_for(FakeModelController::new(included("b")), executor);

    first.prepare_to_schedule_tasks()?;
    second.prepare_to_schedule_tasks()?;
    let mut graph = first.new_work_graph()?;

    let result = second.finalize_work_graph(&mut graph);
    assert!(matches!(result, Err(CompositeError::ForeignWorkGraph { .. })));
    assert_eq!(second.phase(), BuildPhase::TaskSchedule);
    Ok(())
}

#[test]
fn close_runs_hooks_once_and_reports_io_failures() -> TestResult {
    init_tracing();
    let model = FakeModelController::new(BuildIdentifier::Root).failing_close();
    let close_calls = Arc::clone(&model.close_calls);
    let lifecycle = lifecycle_for(model, Arc::new(FakeExecutor::new()));

    lifecycle.prepare_to_schedule_tasks()?;
    let mut graph = lifecycle.new_work_graph()?;

    assert!(matches!(graph.close(), Err(CompositeError::IoError(_))));
    graph.close()?;
    assert_eq!(close_calls.load(Ordering::SeqCst), 1);
    Ok(())
}
