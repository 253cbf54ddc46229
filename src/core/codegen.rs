//! Stack generation: dispatch each stack kind to its builder.

use super::resolver::ResolvedConfig;
use super::types::{StackKind, SynthesizedStack};
use crate::stacks::{self, SynthState};

/// Build one stack. Builders that import outputs fail if the producing
/// stack is not yet in `state`.
pub fn build_stack(
    kind: StackKind,
    ctx: &ResolvedConfig,
    state: &mut SynthState,
) -> Result<SynthesizedStack, String> {
    match kind {
        StackKind::SharedTables => Ok(stacks::tables::build_shared(ctx)),
        StackKind::Media => Ok(stacks::media::build(ctx)),
        StackKind::ApiDomain => Ok(stacks::domain::build(ctx)),
        StackKind::Identity => Ok(stacks::identity::build(ctx)),
        StackKind::Api => stacks::api::build(ctx, state),
        StackKind::FrontEnd => stacks::frontend::build(ctx, state),
    }
}
