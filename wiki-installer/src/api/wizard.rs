// Wizard step submission endpoint
//
// One request shape, one response envelope. Engine rejections become `success: false` with a
// message; they never escape as errors.

use log::{debug, warn};

use crate::models::requests::{StepRequest, WizardAction};
use crate::models::responses::{ApiResponse, StepResponse};
use crate::wizard::engine::{AdvanceOutcome, WizardEngine};
use crate::wizard::error::WizardError;

pub async fn handle(engine: &mut WizardEngine, req: StepRequest) -> ApiResponse<StepResponse> {
    debug!(
        "[PHASE: api] [STEP: {:?}] Request on {} ({} field(s))",
        req.action,
        engine.current_step(),
        req.fields.len()
    );

    match req.action {
        WizardAction::View => ApiResponse::ok(StepResponse::view(engine.view())),

        WizardAction::Advance => match engine.advance(&req.fields).await {
            Ok(AdvanceOutcome::Advanced { .. }) => ApiResponse::ok(StepResponse::view(engine.view())),
            Ok(AdvanceOutcome::Rejected { violations }) => {
                let response = StepResponse {
                    violations: violations.violations,
                    ..StepResponse::view(engine.view())
                };
                ApiResponse::rejected(response, "Please correct the highlighted fields.")
            }
            Ok(AdvanceOutcome::Installed { record }) => ApiResponse::ok(StepResponse {
                finalization: Some(record),
                ..StepResponse::view(engine.view())
            }),
            // Retryable: keep the operator on the step with everything they entered.
            Err(WizardError::Finalize(e)) if !e.is_fatal() => {
                ApiResponse::rejected(StepResponse::view(engine.view()), e.to_string())
            }
            Err(e) => engine_failure(e),
        },

        WizardAction::Retreat => match engine.retreat() {
            Ok(_) => ApiResponse::ok(StepResponse::view(engine.view())),
            Err(e) => engine_failure(e),
        },

        WizardAction::Test => {
            let Some(kind) = req.probe else {
                return ApiResponse::fail("Invalid request: 'probe' is required for the test action");
            };
            match engine.probe(kind, &req.fields).await {
                Ok(result) => {
                    let succeeded = result.succeeded;
                    let message = result.message.clone();
                    let response = StepResponse {
                        probe: Some(result),
                        ..StepResponse::view(engine.view())
                    };
                    if succeeded {
                        ApiResponse::ok(response)
                    } else {
                        ApiResponse::rejected(response, message)
                    }
                }
                Err(e) => engine_failure(e),
            }
        }

        WizardAction::SelectLanguage => {
            let Some(tag) = req.language.as_deref() else {
                return ApiResponse::fail("Invalid request: 'language' is required for selectLanguage");
            };
            match engine.select_language(tag) {
                Ok(_) => ApiResponse::ok(StepResponse::view(engine.view())),
                Err(e) => engine_failure(e),
            }
        }
    }
}

fn engine_failure(e: WizardError) -> ApiResponse<StepResponse> {
    warn!("[PHASE: api] [STEP: dispatch] {}", e);
    ApiResponse::fail(e.to_string())
}
