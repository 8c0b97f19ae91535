use thiserror::Error;

/// I/O errors that can occur when reading slide bytes
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// The file could not be opened or read
    #[error("I/O error on {path}: {message}")]
    File { path: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File does not exist
    #[error("File not found: {0}")]
    NotFound(String),
}

impl IoError {
    pub(crate) fn from_std(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(path.to_string())
        } else {
            IoError::File {
                path: path.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Errors related to format detection
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// JPEG 2000 parsing error
    #[error("JPEG 2000 error: {0}")]
    Jp2(#[from] Jp2Error),

    /// Slide geometry could not be turned into metadata
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// File format is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0} (only JPEG is supported)")]
    UnsupportedCompression(String),

    /// File uses strips instead of tiles
    #[error("Unsupported organization: file uses strips instead of tiles")]
    StripOrganization,

    /// No IFD in the file looks like a pyramid level
    #[error("No pyramid levels found")]
    NoPyramidLevels,

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors that can occur when parsing or decoding JPEG 2000 files
#[derive(Debug, Clone, Error)]
pub enum Jp2Error {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Neither a JP2 signature box nor a J2K SOC marker
    #[error("Not a JPEG 2000 file")]
    InvalidSignature,

    /// A JP2 box header is truncated or has an impossible length
    #[error("Malformed box at offset {offset}: {message}")]
    MalformedBox { offset: u64, message: String },

    /// The contiguous codestream box is absent
    #[error("No codestream (jp2c) box found")]
    MissingCodestream,

    /// A required codestream marker segment is absent
    #[error("Missing marker segment: {0}")]
    MissingMarker(&'static str),

    /// A marker segment is truncated or inconsistent
    #[error("Malformed {marker} marker segment: {message}")]
    MalformedMarker {
        marker: &'static str,
        message: String,
    },

    /// OpenJPEG failed to decode the requested window
    #[error("JPEG 2000 decode failed: {0}")]
    Decode(String),
}

/// Errors raised while validating slide geometry into metadata
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetadataError {
    /// The backend reported no pyramid levels
    #[error("Slide has no pyramid levels")]
    NoLevels,

    /// Level dimension and downsample tables differ in length
    #[error("Level table mismatch: {dimensions} dimensions vs {downsamples} downsamples")]
    LevelTableMismatch {
        dimensions: usize,
        downsamples: usize,
    },

    /// A level has a zero-sized axis
    #[error("Level {level} has empty dimensions {width}x{height}")]
    EmptyLevel { level: usize, width: u32, height: u32 },

    /// A level is not smaller than the one before it
    #[error("Level {level} dimensions {dimensions:?} do not shrink from {previous:?}")]
    NonDecreasingDimensions {
        level: usize,
        dimensions: (u32, u32),
        previous: (u32, u32),
    },

    /// Baseline downsample is not 1
    #[error("Level 0 downsample must be 1, got {0}")]
    InvalidBaselineDownsample(f64),

    /// Downsamples are not strictly increasing
    #[error("Level {level} downsample {downsample} does not exceed the previous level's {previous}")]
    NonMonotonicDownsample {
        level: usize,
        downsample: f64,
        previous: f64,
    },
}

/// Errors raised by the scale resolver
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    /// The requested units need calibration the slide does not have
    #[error("Cannot resolve {units} request: {field} is undetermined for this slide")]
    MissingCalibration {
        units: &'static str,
        field: &'static str,
    },

    /// Unit string not recognised
    #[error("Invalid units {0:?}: expected one of level, mpp, power, baseline")]
    InvalidUnits(String),

    /// Requested level falls outside the pyramid
    #[error("Target level {level} is outside the pyramid ({level_count} levels)")]
    LevelOutOfRange { level: f64, level_count: usize },

    /// Requested resolution value is not usable
    #[error("Invalid resolution value {value} for {units}")]
    InvalidResolution { value: f64, units: &'static str },

    /// Region bounds are empty or inverted
    #[error("Invalid bounds ({left}, {top}, {right}, {bottom})")]
    InvalidBounds {
        left: i64,
        top: i64,
        right: i64,
        bottom: i64,
    },
}

/// Errors raised by a backend while decoding pixels
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// I/O error while reading tile bytes
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF structure error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// JPEG 2000 error
    #[error("JPEG 2000 error: {0}")]
    Jp2(#[from] Jp2Error),

    /// Compressed tile data could not be decoded
    #[error("Failed to decode tile: {message}")]
    Decode { message: String },

    /// Level index not present in the backend
    #[error("Level {level} out of range (slide has {level_count} levels)")]
    LevelOutOfRange { level: usize, level_count: usize },
}

/// Errors returned by region reads
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    /// The request could not be resolved to a read plan
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The backend failed to decode the planned window
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors raised while exporting tiles
#[derive(Debug, Error)]
pub enum ExportError {
    /// Region read failed
    #[error(transparent)]
    Read(#[from] ReadError),

    /// Output directory or file could not be written
    #[error("Failed to write {path}: {message}")]
    Write { path: String, message: String },

    /// Tile index could not be written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Image encoding failed
    #[error("Failed to encode {path}: {message}")]
    Encode { path: String, message: String },
}
