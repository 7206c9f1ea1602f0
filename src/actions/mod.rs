pub mod interaction;
pub mod remediation;

pub use interaction::{Interaction, InteractionEngine, InteractionRecord, SettlePolicy};
pub use remediation::{
    AttemptOutcome, AttemptRecord, FormControl, FormField, LoginAttempt, LoginConfirmation,
    LoginForm, LoginReport, LoginRunner, LoginStage, RemediationStep,
};
