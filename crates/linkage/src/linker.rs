use crate::blocking::generate_candidates;
use crate::compare::comparison_vectors;
use crate::config::{LinkConfig, TrainingPolicy};
use crate::diagnostics::{Diagnostics, LogDiagnostics, Stage};
use crate::em::{train_em, EmSettings};
use crate::error::LinkError;
use crate::estimate::{estimate_prior, estimate_u};
use crate::evidence::compute_summary;
use crate::frame::ComparisonFrame;
use crate::model::{LinkMeta, LinkResult, RecordSet};
use crate::params::ModelParameters;
use crate::projector::{project, ComparisonSchema};

/// Owns one validated configuration and runs the full pipeline over two
/// record sets.
pub struct Linker<'a> {
    config: LinkConfig,
    diagnostics: &'a dyn Diagnostics,
}

impl<'a> Linker<'a> {
    pub fn new(config: LinkConfig, diagnostics: &'a dyn Diagnostics) -> Result<Self, LinkError> {
        config.validate()?;
        Ok(Self {
            config,
            diagnostics,
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Project both sets and build the normalized comparison frame.
    pub fn prepare(
        &self,
        left: &RecordSet,
        right: &RecordSet,
    ) -> Result<ComparisonFrame, LinkError> {
        let schema = ComparisonSchema::resolve(&self.config, left, right)?;
        let (left, right) = project(&schema, left, right, &self.config.id_field, self.diagnostics)?;
        ComparisonFrame::build(&schema, &left, &right, &self.config.id_field)
    }

    /// Estimate u and the prior, then run every training pass the policy
    /// selects, refining one shared parameter set.
    pub fn train(&self, frame: &ComparisonFrame) -> Result<ModelParameters, LinkError> {
        let training = &self.config.training;
        let mut params = ModelParameters::new(&frame.schema, training.prior_match_probability);

        estimate_u(
            frame,
            &mut params,
            training.max_random_sample_pairs,
            training.seed,
            self.diagnostics,
        )?;

        if !self.config.deterministic_rules.is_empty() {
            estimate_prior(
                frame,
                &self.config.deterministic_rules,
                self.config.expected_recall,
                &mut params,
                self.diagnostics,
            )?;
        }

        let settings = EmSettings::from_config(training);
        let rules = self.config.training_rules(&frame.schema.names());
        for rule in &rules {
            match train_em(frame, rule, &mut params, &settings, self.diagnostics) {
                Ok(_) => {}
                // Implicit passes over every blocking key tolerate keys that
                // cannot train; explicitly requested passes must succeed.
                Err(err) if training.policy == TrainingPolicy::AllBlockingKeys => {
                    self.diagnostics
                        .warn(Stage::Training, &format!("skipping pass '{rule}': {err}"));
                }
                Err(err) => return Err(err),
            }
        }
        if rules.is_empty() {
            self.diagnostics.info(
                Stage::Training,
                "training policy selects no EM passes; scoring with estimated parameters",
            );
        } else if params.history.is_empty() {
            self.diagnostics.warn(
                Stage::Training,
                "no EM pass completed; scoring with estimated parameters",
            );
        }

        Ok(params)
    }

    pub fn link(&self, left: &RecordSet, right: &RecordSet) -> Result<LinkResult, LinkError> {
        self.diagnostics.info(
            Stage::Linker,
            &format!(
                "linking '{}' ({} rows) to '{}' ({} rows)",
                left.source,
                left.len(),
                right.source,
                right.len()
            ),
        );

        let frame = self.prepare(left, right)?;
        let params = self.train(&frame)?;

        let keys = self.config.effective_blocking_keys(&frame.schema.names());
        let candidates = generate_candidates(&frame, &keys, self.diagnostics)?;
        let vectors = comparison_vectors(&frame, &candidates.pairs);
        let matches = crate::scorer::predict(
            &frame,
            &candidates.pairs,
            &vectors,
            &params,
            self.config.match_threshold,
            self.diagnostics,
        )?;

        let summary = compute_summary(
            &frame,
            &candidates,
            &vectors,
            &matches,
            self.config.match_threshold,
        );

        Ok(LinkResult {
            meta: LinkMeta {
                config_name: self.config.name.clone(),
                left_source: left.source.clone(),
                right_source: right.source.clone(),
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                run_at: chrono::Utc::now().to_rfc3339(),
            },
            summary,
            parameters: params.snapshot(),
            training: params.history,
            matches,
        })
    }
}

/// Run linkage per config, reporting through the `log` facade.
pub fn run(
    config: &LinkConfig,
    left: &RecordSet,
    right: &RecordSet,
) -> Result<LinkResult, LinkError> {
    Linker::new(config.clone(), &LogDiagnostics)?.link(left, right)
}
