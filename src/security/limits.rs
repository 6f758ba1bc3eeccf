/// Size limits applied while decoding a request
#[derive(Debug, Clone)]
pub struct RequestLimits {
    /// Maximum size of the request line plus headers in bytes
    pub max_head_size: usize,
    /// Maximum number of header fields
    pub max_headers: usize,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_head_size: 64 * 1024,
            max_headers: 100,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

impl RequestLimits {
    /// Validator for the declared body length
    pub fn body_validator(&self) -> SizeValidator {
        SizeValidator::new(self.max_body_size)
    }

    /// Validator for the buffered request head
    pub fn head_validator(&self) -> SizeValidator {
        SizeValidator::new(self.max_head_size)
    }
}

/// Size validator for requests
#[derive(Debug, Clone, Copy)]
pub struct SizeValidator {
    max_size: usize,
}

impl SizeValidator {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    pub fn validate_size(&self, size: usize) -> Result<(), SizeError> {
        if size > self.max_size {
            Err(SizeError::TooLarge {
                actual: size,
                max: self.max_size,
            })
        } else {
            Ok(())
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SizeError {
    #[error("Request too large: {actual} bytes, maximum allowed: {max} bytes")]
    TooLarge { actual: usize, max: usize },
}
