use fulldome::ProjectionParameters;

/// Remembers which source and parameters the preview texture was last
/// rendered from, so a render starts only when one of them moved. Edits
/// made while a render is in flight are picked up once it finishes.
#[derive(Debug, Default)]
pub struct RenderState {
    source_generation: u64,
    rendered: Option<(u64, ProjectionParameters)>,
}

impl RenderState {
    /// A new source was loaded; whatever is on screen is out of date.
    pub fn source_replaced(&mut self) {
        self.source_generation += 1;
    }

    pub fn needs_render(&self, params: &ProjectionParameters) -> bool {
        self.rendered != Some((self.source_generation, *params))
    }

    /// Records that a render of the current source with `params` started.
    pub fn rendering(&mut self, params: ProjectionParameters) {
        self.rendered = Some((self.source_generation, params));
    }
}
