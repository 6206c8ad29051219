pub mod evaluation;
pub mod scaler;
pub mod validation;
