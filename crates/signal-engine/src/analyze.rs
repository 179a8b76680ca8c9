//! Definition validation
//!
//! Walks a raw definition before it is compiled and rejects anything the
//! executor could not run. Any action is valid in any list; its kind only
//! decides how it runs there. Positions in errors refer to the definition as
//! written, so output maps count as items.

use crate::chain::{describe_value, Chain};
use crate::error::DefinitionError;
use crate::tree::{format_path, PathSegment};

/// Validate a signal definition
pub fn analyze(signal: &str, definition: &[Chain]) -> Result<(), DefinitionError> {
    Analyzer { signal }.list(definition, &mut Vec::new(), false)
}

struct Analyzer<'a> {
    signal: &'a str,
}

impl Analyzer<'_> {
    fn list(
        &self,
        items: &[Chain],
        path: &mut Vec<PathSegment>,
        concurrent: bool,
    ) -> Result<(), DefinitionError> {
        let mut previous: Option<&Chain> = None;

        for (index, item) in items.iter().enumerate() {
            path.push(PathSegment::Index(index));

            match item {
                Chain::Action(_) => {}
                Chain::Parallel(members) => {
                    if concurrent {
                        return Err(DefinitionError::NestedGroup {
                            signal: self.signal.to_string(),
                            position: format_path(path),
                        });
                    }
                    self.list(members, path, true)?;
                }
                Chain::Paths(paths) => {
                    let Some(Chain::Action(action)) = previous else {
                        return Err(DefinitionError::OrphanOutputs {
                            signal: self.signal.to_string(),
                            position: format_path(path),
                            follows: previous
                                .map(Chain::describe)
                                .unwrap_or_else(|| "nothing".to_string()),
                        });
                    };
                    for (output, branch) in paths {
                        if !action.declares(output) {
                            return Err(DefinitionError::UndeclaredOutput {
                                signal: self.signal.to_string(),
                                position: format_path(path),
                                action: action.name().to_string(),
                                output: output.clone(),
                            });
                        }
                        path.push(PathSegment::Key("outputs".to_string()));
                        path.push(PathSegment::Key(output.clone()));
                        self.list(branch, path, false)?;
                        path.pop();
                        path.pop();
                    }
                }
                Chain::Unresolved(name) => {
                    return Err(DefinitionError::UnresolvedAction {
                        signal: self.signal.to_string(),
                        position: format_path(path),
                        name: name.clone(),
                    })
                }
                Chain::Invalid(value) => {
                    return Err(DefinitionError::InvalidLeaf {
                        signal: self.signal.to_string(),
                        position: format_path(path),
                        found: describe_value(value).to_string(),
                    })
                }
            }

            path.pop();
            previous = Some(item);
        }

        Ok(())
    }
}
