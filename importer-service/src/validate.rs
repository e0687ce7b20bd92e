use crate::influx::FetchError;

/// Outcome of the bounded read-only setup probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    SuccessWithData,
    /// Connected fine but found no water consumption rows. Setup still
    /// proceeds; data may start arriving later.
    SuccessWithoutData,
}

/// User-facing classification of a failed probe, one form error per variant.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid_auth")]
    InvalidAuth,
    #[error("cannot_connect")]
    CannotConnect,
    #[error("unknown_error")]
    Unknown,
}

impl From<FetchError> for ValidationError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::InvalidAuth => Self::InvalidAuth,
            FetchError::CannotConnect(_) | FetchError::Query(_) => Self::CannotConnect,
            FetchError::Decode(_) => Self::Unknown,
        }
    }
}

/// Map a probe result onto the setup taxonomy.
pub fn classify(probe: Result<bool, FetchError>) -> Result<ValidationOutcome, ValidationError> {
    match probe {
        Ok(true) => Ok(ValidationOutcome::SuccessWithData),
        Ok(false) => Ok(ValidationOutcome::SuccessWithoutData),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_results_map_to_outcomes() {
        assert_eq!(classify(Ok(true)), Ok(ValidationOutcome::SuccessWithData));
        assert_eq!(classify(Ok(false)), Ok(ValidationOutcome::SuccessWithoutData));
    }

    #[test]
    fn fetch_errors_map_to_form_errors() {
        assert_eq!(
            classify(Err(FetchError::InvalidAuth)),
            Err(ValidationError::InvalidAuth)
        );
        assert_eq!(
            classify(Err(FetchError::CannotConnect("refused".to_string()))),
            Err(ValidationError::CannotConnect)
        );
        assert_eq!(
            classify(Err(FetchError::Query("boom".to_string()))),
            Err(ValidationError::CannotConnect)
        );
        assert_eq!(
            classify(Err(FetchError::Decode("bad csv".to_string()))),
            Err(ValidationError::Unknown)
        );
    }
}
