//! # FHIRPath Repeat Functions
//!
//! Implements `repeat()` and `repeatAll()` for recursive traversal of tree
//! structures. Both apply a projection to the input, then to the projected
//! items, until a round yields nothing new.
//!
//! Traversal is bounded by the context's [`EvaluationLimits`]: exceeding the
//! round count or the result size fails with `ResourceExhausted`.
//!
//! [`EvaluationLimits`]: crate::context::EvaluationLimits

use atrius_fhirpath_support::{Collection, EvaluationError, EvaluationResult, Value};
use tracing::{debug, warn};

use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;
use crate::operators::contains_equal;

/// Breadth-first expansion of `seeds` through `step`, shared by `repeat`,
/// `repeatAll` and `descendants`.
///
/// # Arguments
///
/// * `function` - Name used in diagnostics
/// * `seeds` - The starting items; they are not part of the result
/// * `deduplicate` - Drop items equal to one already seen, seeds included
/// * `step` - Produces the next items for one item
///
/// # Returns
///
/// * Every item produced, in discovery order
/// * `Err(ResourceExhausted)` - If the round or size cap is exceeded
pub fn expand<F>(
    evaluator: &mut Evaluator<'_>,
    function: &str,
    seeds: &[Value],
    deduplicate: bool,
    mut step: F,
) -> Result<Collection, EvaluationError>
where
    F: FnMut(&mut Evaluator<'_>, &Value) -> Result<Collection, EvaluationError>,
{
    let limits = evaluator.context().limits();
    let mut seen: Vec<Value> = if deduplicate { seeds.to_vec() } else { Vec::new() };
    let mut result = Collection::new();
    let mut frontier = seeds.to_vec();
    let mut round = 0;

    while !frontier.is_empty() {
        round += 1;
        if round > limits.max_iterations {
            warn!(function, rounds = round - 1, "iteration cap reached");
            return Err(EvaluationError::ResourceExhausted(format!(
                "{}() exceeded {} iterations",
                function, limits.max_iterations
            )));
        }
        let mut next = Vec::new();
        for item in &frontier {
            for produced in step(evaluator, item)? {
                if deduplicate {
                    if contains_equal(evaluator.context(), &seen, &produced) {
                        continue;
                    }
                    seen.push(produced.clone());
                }
                result.push(produced.clone());
                next.push(produced);
            }
        }
        if result.len() > limits.max_collection_size {
            warn!(function, size = result.len(), "collection size cap reached");
            return Err(EvaluationError::ResourceExhausted(format!(
                "{}() produced more than {} items",
                function, limits.max_collection_size
            )));
        }
        debug!(function, round, discovered = next.len(), total = result.len(), "expansion round");
        frontier = next;
    }
    Ok(result)
}

fn repeat_with(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
    deduplicate: bool,
) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let projection = &site.args[0];
    let items = expand(
        evaluator,
        site.name,
        &site.input.collection,
        deduplicate,
        |ev, item| Ok(ev.evaluate_for_item(projection, item, 0, None)?.into_collection()),
    )?;
    Ok(EvaluationResult::new(items, site.input.ordered))
}

/// Implements the FHIRPath repeat() function
///
/// # Syntax
/// `repeat(projection: expression) : collection`
///
/// Items equal to one already produced (or to an input item) are dropped,
/// which also ends cycles.
fn repeat_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    repeat_with(evaluator, site, true)
}

/// Implements the FHIRPath repeatAll() function: `repeat()` without
/// deduplication.
fn repeat_all_function(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
) -> Result<EvaluationResult, EvaluationError> {
    repeat_with(evaluator, site, false)
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("repeat", repeat_function);
    registry.register("repeatAll", repeat_all_function);
}
