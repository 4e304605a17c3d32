use crate::error::{GraphError, GraphResult};

use super::Graph;

impl Graph {
    /// Checks the bidirectional edge index over the whole arena.
    ///
    /// Every input must be listed by the output it reads, every listed consumer must read the
    /// listing output, and control dependencies must name live nodes. The first violation is
    /// reported.
    pub fn verify_edges(&self) -> GraphResult<()> {
        for node in self.nodes() {
            for input in node.inputs() {
                let source = input.source_output();
                let registered = self
                    .output(source)
                    .map(|output| output.target_inputs().contains(&input.handle()));
                match registered {
                    Ok(true) => {}
                    Ok(false) => {
                        return Err(GraphError::InconsistentEdges {
                            input: input.handle(),
                            detail: format!("not registered with {source}"),
                        })
                    }
                    Err(_) => {
                        return Err(GraphError::InconsistentEdges {
                            input: input.handle(),
                            detail: format!("reads missing {source}"),
                        })
                    }
                }
            }

            for output in node.outputs() {
                for target in output.target_inputs() {
                    match self.input(*target) {
                        Ok(input) if input.source_output() == output.handle() => {}
                        Ok(input) => {
                            return Err(GraphError::InconsistentEdges {
                                input: *target,
                                detail: format!(
                                    "listed by {} but reads {}",
                                    output.handle(),
                                    input.source_output()
                                ),
                            })
                        }
                        Err(_) => {
                            return Err(GraphError::InconsistentEdges {
                                input: *target,
                                detail: format!("listed by {} but does not exist", output.handle()),
                            })
                        }
                    }
                }
            }

            if let Some(dep) = node
                .control_dependencies()
                .iter()
                .find(|dep| !self.contains(**dep))
            {
                return Err(GraphError::StaleNode { node: *dep });
            }
        }
        Ok(())
    }
}
