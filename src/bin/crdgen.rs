//! # CRD Generator
//!
//! Prints the `WorkflowExecution` CustomResourceDefinition as YAML.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/workflowexecution.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use workflow_execution_controller::crd::WorkflowExecution;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&WorkflowExecution::crd())?);
    Ok(())
}
