use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum NNError {
    // Model related errors
    InvalidLayerConfiguration(String),
    LayerShapeMismatch(String),
    EmptyModel,

    // Training related errors
    InvalidInputShape(String),
    InvalidBatchSize(usize),
    LabelOutOfRange { label: usize, num_classes: usize },

    // Dataset related errors
    DatasetFormat(String),

    // File operations
    ModelLoadError(String),
    ModelSaveError(String),
    PlotError(String),

    IoError(std::io::Error),
    SerializationError(Box<bincode::ErrorKind>),
    CsvError(csv::Error),
    ShapeError(ndarray::ShapeError),

    Other(String),
}

impl fmt::Display for NNError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NNError::InvalidLayerConfiguration(msg) => write!(f, "Invalid layer configuration: {}", msg),
            NNError::LayerShapeMismatch(msg) => write!(f, "Layer shape mismatch: {}", msg),
            NNError::EmptyModel => write!(f, "Model has no layers"),
            NNError::InvalidInputShape(msg) => write!(f, "Invalid input shape: {}", msg),
            NNError::InvalidBatchSize(size) => write!(f, "Invalid batch size: {} (must be at least 1)", size),
            NNError::LabelOutOfRange { label, num_classes } => {
                write!(f, "Label {} out of range for {} classes", label, num_classes)
            }
            NNError::DatasetFormat(msg) => write!(f, "Malformed dataset: {}", msg),
            NNError::ModelLoadError(msg) => write!(f, "Failed to load model: {}", msg),
            NNError::ModelSaveError(msg) => write!(f, "Failed to save model: {}", msg),
            NNError::PlotError(msg) => write!(f, "Failed to render plot: {}", msg),
            NNError::IoError(err) => write!(f, "I/O error: {}", err),
            NNError::SerializationError(err) => write!(f, "Serialization error: {}", err),
            NNError::CsvError(err) => write!(f, "CSV error: {}", err),
            NNError::ShapeError(err) => write!(f, "Shape error: {}", err),
            NNError::Other(err) => write!(f, "Other error: {}", err),
        }
    }
}

impl From<std::io::Error> for NNError {
    fn from(err: std::io::Error) -> NNError {
        NNError::IoError(err)
    }
}

impl From<Box<bincode::ErrorKind>> for NNError {
    fn from(err: Box<bincode::ErrorKind>) -> NNError {
        NNError::SerializationError(err)
    }
}

impl From<csv::Error> for NNError {
    fn from(err: csv::Error) -> NNError {
        NNError::CsvError(err)
    }
}

impl From<ndarray::ShapeError> for NNError {
    fn from(err: ndarray::ShapeError) -> NNError {
        NNError::ShapeError(err)
    }
}

impl Error for NNError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NNError::IoError(err) => Some(err),
            NNError::SerializationError(err) => Some(err),
            NNError::CsvError(err) => Some(err),
            NNError::ShapeError(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, NNError>;
