//! Loading a full authoring document and running it end to end.

mod common;

use std::sync::Arc;

use common::*;
use triagegraph::events::EventSender;
use triagegraph::executor::GraphExecutor;
use triagegraph::graph::{GraphMeta, GraphStructureError, load_graph};
use triagegraph::memory::{ERROR_ACTION, MemoryStore};
use triagegraph::state::NodeAnnotations;
use triagegraph::subject::Subject;

const FLOW_DOCUMENT: &str = r#"{
  "nodes": [
    {
      "id": "1",
      "type": "input",
      "data": {"question": "", "regex": "", "action": "", "description": "start"},
      "position": {"x": 0, "y": 0}
    },
    {
      "id": "2",
      "type": "default",
      "data": {
        "question": "is the container ready?",
        "regex": "",
        "action": "inspect readiness",
        "description": "readiness probe"
      },
      "position": {"x": 0, "y": 120}
    },
    {
      "id": "3",
      "type": "output",
      "data": {"question": "", "regex": "", "action": "", "description": "container never became ready"},
      "position": {"x": 0, "y": 240}
    }
  ],
  "edges": [
    {"id": "1->2", "source": "1", "target": "2", "data": {"label": ""}},
    {"id": "2->3", "source": "2", "target": "3", "type": "default", "data": {"label": "no"}}
  ],
  "position": [0, 0],
  "zoom": 1.0,
  "viewport": {"x": 0, "y": 0, "zoom": 1.0}
}"#;

#[tokio::test]
async fn loaded_document_runs_to_terminal() {
    let meta = GraphMeta {
        name: "readiness triage".to_string(),
        category: "pod".to_string(),
        purpose: "diagnose readiness failures".to_string(),
    };
    let graph = Arc::new(load_graph("readiness", FLOW_DOCUMENT, meta).unwrap());
    assert_eq!(graph.start_node_id(), "1");
    assert_eq!(graph.name, "readiness triage");

    let annotations = Arc::new(NodeAnnotations::new());
    let action_executor = RecordingExecutor::new("probe output");
    let extract = extract_stage(FixedOracle::new("no"), 1);
    let memory = Arc::new(MemoryStore::with_parts(
        graph.clone(),
        annotations.clone(),
        Subject::new("web-1", "prod"),
        action_executor.clone(),
        extract.clone(),
        EventSender::disconnected(),
        2,
    ));

    let executor = GraphExecutor::builder()
        .graph(graph)
        .annotations(annotations.clone())
        .memory(memory.clone())
        .subject(Subject::new("web-1", "prod"))
        .action_executor(action_executor.clone())
        .thinking_stage(thinking_stage(FixedOracle::new("{}"), None))
        .extract_stage(extract)
        .conclusion_stage(conclusion_stage(FixedOracle::new("verdict")))
        .build();

    executor.execute().await;

    // Decision 2 concluded "no" and routed to terminal 3.
    assert_eq!(annotations.conclusion("2").as_deref(), Some("no"));
    assert_eq!(action_executor.invoked(), vec!["inspect readiness"]);
    let terminal = memory.get(ERROR_ACTION).expect("terminal record");
    assert_eq!(terminal.description, "container never became ready");
}

#[test]
fn duplicate_entries_fail_before_any_traversal() {
    let doc = r#"{
      "nodes": [
        {"id": "a", "type": "input", "data": {}, "position": {"x": 0, "y": 0}},
        {"id": "b", "type": "input", "data": {}, "position": {"x": 1, "y": 0}}
      ],
      "edges": []
    }"#;
    let err = load_graph("dup", doc, GraphMeta::default()).unwrap_err();
    assert!(matches!(err, GraphStructureError::MultipleEntries { .. }));
}
