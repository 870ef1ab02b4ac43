/// Main error type for the library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed input data, like depth and color rasters with different sizes.
    #[error("Input error: {0}")]
    Input(String),
    /// The image file could not be decoded.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Used when the user pass a logical invalid parameter to a function.
    #[error("Parameter error: {0}")]
    InvalidParameter(String),
    /// ICP found no correspondence within the maximum correspondence distance, or
    /// the ones it found could not produce an update.
    #[error(
        "Registration failed at iteration {iteration}: {}",
        registration_failure(.num_correspondences)
    )]
    Registration {
        /// Iteration (0-based) in which the registration failed.
        iteration: usize,
        /// Correspondences found within the maximum distance at that iteration.
        num_correspondences: usize,
        /// Fitness of the last iteration that had correspondences.
        last_fitness: Option<f32>,
    },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Parser error: {0}")]
    Parser(String),
}

fn registration_failure(num_correspondences: &usize) -> String {
    if *num_correspondences == 0 {
        "no correspondences within the maximum distance".to_string()
    } else {
        format!("{num_correspondences} correspondences but no solvable update")
    }
}

impl Error {
    /// Create a error with the kind `InvalidParameter`.
    /// # Arguments
    /// * `msg` - The error message.
    pub fn invalid_parameter<T: ToString>(msg: T) -> Self {
        Error::InvalidParameter(msg.to_string())
    }

    /// Create a error with the kind `Input`.
    pub fn input<T: ToString>(msg: T) -> Self {
        Error::Input(msg.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parser(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
