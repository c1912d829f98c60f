/// Render passes serialized over shared backend state.
pub mod renderer;
