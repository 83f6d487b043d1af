
use std::error::Error;
use std::fmt::{self, Display, Debug};

pub trait ErrorDescription {
    fn description(&self) -> impl Display;
    /// HTTP status code or other numeric code attached to the error, if any.
    fn code(&self) -> Option<i32> {
        None
    }
    fn error_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
    /// Whether repeating the failed operation may succeed.
    fn is_retryable(&self) -> bool {
        false
    }
}

impl<T> ErrorDescription for T
where
    T: Display,
{
    fn description(&self) -> impl Display {
        self
    }
}

pub struct GenericError<T>(pub T) where T: ErrorDescription;

impl<T> GenericError<T>
where
    T: ErrorDescription,
{
    pub const fn new(err: T) -> Self {
        Self(err)
    }

    pub fn as_inner(&self) -> &T {
        &self.0
    }

    pub fn error_name(&self) -> &'static str {
        self.0.error_name()
    }

    pub fn is_retryable(&self) -> bool {
        self.0.is_retryable()
    }
}

impl<T> Debug for GenericError<T>
where
    T: ErrorDescription,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(code) = self.0.code() {
            write!(f, "GenericError({}): {} ({})", self.error_name(), self.0.description(), code)
        } else {
            write!(f, "GenericError({}): {}", self.error_name(), self.0.description())
        }
    }
}

impl<T> Display for GenericError<T>
where
    T: ErrorDescription,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.description())
    }
}

impl<T> Error for GenericError<T>
where
    T: ErrorDescription,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

/// Renders an error followed by every error in its source chain.
pub fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.contains(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}
