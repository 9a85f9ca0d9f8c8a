use crate::algorithms::phase_correlation::PhaseCorrelation;
use crate::algorithms::radon::RadonProjector;
use crate::algorithms::warp::SplineWarp;
use crate::error::AlignError;
use crate::logging::{MetricsCollector, TracingObserver};
use crate::pipeline::engine::Aligner;
use crate::pipeline::traits::{AlignmentObserver, ArtifactSink, Projector, Reconstructor, Registrar, Warper};
use crate::pipeline::types::{AlignOptions, CancellationToken};
use crate::Result;
use std::sync::Arc;

/// Builder for an [`Aligner`].
///
/// Unset operators fall back to the in-crate defaults: [`RadonProjector`],
/// the reconstruction strategy named in the options, [`PhaseCorrelation`],
/// [`SplineWarp`] and a [`TracingObserver`].
#[derive(Default)]
pub struct AlignerBuilder {
    options: AlignOptions,
    projector: Option<Arc<dyn Projector>>,
    reconstructor: Option<Arc<dyn Reconstructor>>,
    registrar: Option<Arc<dyn Registrar>>,
    warper: Option<Arc<dyn Warper>>,
    observer: Option<Arc<dyn AlignmentObserver>>,
    sink: Option<Arc<dyn ArtifactSink>>,
    metrics: Option<Arc<MetricsCollector>>,
    cancellation: Option<CancellationToken>,
}

impl AlignerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: AlignOptions) -> Self {
        self.options = options;
        self
    }

    pub fn projector<P: Projector + 'static>(mut self, projector: P) -> Self {
        self.projector = Some(Arc::new(projector));
        self
    }

    /// Overrides the strategy named in the options.
    pub fn reconstructor<R: Reconstructor + 'static>(mut self, reconstructor: R) -> Self {
        self.reconstructor = Some(Arc::new(reconstructor));
        self
    }

    pub fn registrar<R: Registrar + 'static>(mut self, registrar: R) -> Self {
        self.registrar = Some(Arc::new(registrar));
        self
    }

    pub fn shared_registrar(mut self, registrar: Arc<dyn Registrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    pub fn warper<W: Warper + 'static>(mut self, warper: W) -> Self {
        self.warper = Some(Arc::new(warper));
        self
    }

    pub fn observer(mut self, observer: Arc<dyn AlignmentObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Validate the options and assemble the aligner.
    pub fn build(self) -> Result<Aligner> {
        self.options.validate()?;
        if self.options.save && self.sink.is_none() {
            return Err(AlignError::configuration("save requested without an artifact sink"));
        }

        let reconstructor = self
            .reconstructor
            .unwrap_or_else(|| Arc::new(self.options.reconstruction));

        Ok(Aligner {
            projector: self.projector.unwrap_or_else(|| Arc::new(RadonProjector)),
            reconstructor,
            registrar: self.registrar.unwrap_or_else(|| Arc::new(PhaseCorrelation::new())),
            warper: self.warper.unwrap_or_else(|| Arc::new(SplineWarp)),
            observer: self.observer.unwrap_or_else(|| Arc::new(TracingObserver)),
            sink: self.sink,
            metrics: self.metrics,
            cancellation: self.cancellation.unwrap_or_default(),
            options: self.options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_without_sink_rejected() {
        let err = AlignerBuilder::new()
            .options(AlignOptions {
                save: true,
                ..Default::default()
            })
            .build()
            .err()
            .unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_defaults_follow_options() {
        let aligner = AlignerBuilder::new().build().unwrap();
        assert_eq!(aligner.options().iterations, 10);
        assert_eq!(aligner.reconstructor.name(), "mlem");
        assert_eq!(aligner.registrar.name(), "PhaseCorrelation");
    }
}
