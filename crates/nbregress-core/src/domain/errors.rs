use std::error::Error;
use std::fmt::{Display, Formatter};

pub type HarnessResult<T> = Result<T, HarnessError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HarnessErrorCategory {
    InputValidationError,
    IoSystemError,
    ComputationError,
    InternalError,
}

impl HarnessErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidationError => 2,
            Self::IoSystemError => 3,
            Self::ComputationError => 4,
            Self::InternalError => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputValidationError => "InputValidationError",
            Self::IoSystemError => "IoSystemError",
            Self::ComputationError => "ComputationError",
            Self::InternalError => "InternalError",
        }
    }
}

/// Error surfaced at the library boundary: a category that maps onto a process
/// exit code, a stable placeholder code, and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessError {
    category: HarnessErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl HarnessError {
    pub fn new(
        category: HarnessErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(
            HarnessErrorCategory::InputValidationError,
            placeholder,
            message,
        )
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(HarnessErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn computation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(HarnessErrorCategory::ComputationError, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(HarnessErrorCategory::InternalError, placeholder, message)
    }

    pub const fn category(&self) -> HarnessErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.placeholder, self.message)
    }

    pub fn fatal_exit_line(&self) -> String {
        format!("FATAL EXIT CODE: {}", self.exit_code())
    }
}

impl Display for HarnessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.as_str(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for HarnessError {}

#[cfg(test)]
mod tests {
    use super::{HarnessError, HarnessErrorCategory};

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (
                HarnessErrorCategory::InputValidationError,
                2,
                "InputValidationError",
            ),
            (HarnessErrorCategory::IoSystemError, 3, "IoSystemError"),
            (HarnessErrorCategory::ComputationError, 4, "ComputationError"),
            (HarnessErrorCategory::InternalError, 5, "InternalError"),
        ];

        for (category, exit_code, name) in cases {
            assert_eq!(category.exit_code(), exit_code);
            assert_eq!(category.as_str(), name);
        }
    }

    #[test]
    fn every_category_renders_as_an_error() {
        let errors = [
            HarnessError::input_validation("INPUT.X", "bad input"),
            HarnessError::io_system("IO.X", "disk"),
            HarnessError::computation("RUN.X", "timeout"),
            HarnessError::internal("SYS.X", "bug"),
        ];
        for error in errors {
            assert!(error.diagnostic_line().starts_with("ERROR: ["));
            assert_ne!(error.exit_code(), 0);
            assert_eq!(
                error.fatal_exit_line(),
                format!("FATAL EXIT CODE: {}", error.exit_code())
            );
        }
    }

    #[test]
    fn fatal_error_renders_diagnostic_lines() {
        let error = HarnessError::input_validation(
            "INPUT.TOLERANCE",
            "IMG_TOL must be a non-negative number, got '-1'",
        );

        assert_eq!(error.exit_code(), 2);
        assert_eq!(
            error.diagnostic_line(),
            "ERROR: [INPUT.TOLERANCE] IMG_TOL must be a non-negative number, got '-1'"
        );
        assert_eq!(error.fatal_exit_line(), "FATAL EXIT CODE: 2");
    }
}
