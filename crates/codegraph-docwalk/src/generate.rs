use codegraph_core::{ArtifactGenerator, CodeGraphError, GenerationRequest, Result};
use std::time::Duration;
use tracing::trace;

/// Call the generator, bounding it by `timeout` regardless of whether the
/// implementation honours the timeout it is handed.
pub(crate) async fn run_generator(
    generator: &dyn ArtifactGenerator,
    request: &GenerationRequest,
    timeout: Duration,
) -> Result<String> {
    trace!(
        node = %request.node.id,
        generator = generator.generator_name(),
        children = request.child_artifacts.len(),
        "Generating artifact"
    );
    match tokio::time::timeout(timeout, generator.generate(request, timeout)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(CodeGraphError::Generation(format!("{:#}", e))),
        Err(_) => Err(CodeGraphError::GenerationTimeout(timeout)),
    }
}
