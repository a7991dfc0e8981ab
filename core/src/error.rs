//! Error types for the Safe application index

use thiserror::Error;

/// Result type for Safe index operations
pub type SafeResult<T> = Result<T, SafeError>;

/// Broad grouping used to decide how far an error propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Payload could not be encoded or decoded
    Codec,
    /// A protocol invariant rejected the command
    Protocol,
    /// The underlying engine failed; the enclosing block operation must abort
    Storage,
    Other,
}

/// Main error type for the Safe application index
#[derive(Error, Debug)]
pub enum SafeError {
    // ============ Codec Errors ============
    #[error("Field {field} too long: {len} bytes exceeds maximum {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unknown command code {0}")]
    UnknownCommandCode(u32),

    // ============ Application Errors ============
    #[error("Application name already exists: {0}")]
    DuplicateAppName(String),

    #[error("Application id already exists: {0}")]
    DuplicateAppId(String),

    #[error("Nonexistent application id: {0}")]
    NonexistentAppId(String),

    #[error("Sender {0} is not the application administrator")]
    NotAppAdmin(String),

    #[error("Insufficient authorization: mask {required} not granted to {address}")]
    InsufficientAuth { address: String, required: u32 },

    #[error("Authorization {auth} already granted to {address}")]
    AuthAlreadyGranted { address: String, auth: u32 },

    #[error("Authorization {auth} not granted to {address}")]
    NonexistentAuth { address: String, auth: u32 },

    // ============ Asset Errors ============
    #[error("Asset short name already exists: {0}")]
    DuplicateShortName(String),

    #[error("Asset name already exists: {0}")]
    DuplicateAssetName(String),

    #[error("Asset id already exists: {0}")]
    DuplicateAssetId(String),

    #[error("Nonexistent asset id: {0}")]
    NonexistentAssetId(String),

    #[error("First issue amount {first} exceeds total amount {total}")]
    FirstExceedsTotal { first: u64, total: u64 },

    #[error("Candy amount {candy} exceeds first issue amount {first}")]
    CandyExceedsFirst { candy: u64, first: u64 },

    #[error("Issuing {requested} would exceed total amount (issued {issued}, total {total})")]
    ExceedsTotalAmount {
        requested: u64,
        issued: u64,
        total: u64,
    },

    #[error("Sender {0} is not the asset issuer")]
    NotAssetIssuer(String),

    #[error("Asset {0} cannot be destroyed")]
    DestroyDisabled(String),

    // ============ Candy Errors ============
    #[error("Candy offer limit reached for asset {asset}: {live} live offers")]
    CandyOfferLimitReached { asset: String, live: usize },

    #[error("Nonexistent candy offer {0}")]
    NonexistentCandyOffer(String),

    #[error("Candy offer {0} has expired")]
    CandyExpired(String),

    #[error("Candy offer {0} is not claimable yet")]
    CandyNotClaimable(String),

    #[error("Address {address} already claimed candy from {offer}")]
    CandyAlreadyClaimed { address: String, offer: String },

    #[error("Candy budget exceeded: requested {requested}, remaining {remaining}")]
    CandyBudgetExceeded { requested: u64, remaining: u64 },

    // ============ Virtual Account Errors ============
    #[error("Virtual account name already exists: {0}")]
    DuplicateAccountName(String),

    #[error("Address {0} already owns a virtual account")]
    DuplicateAccountAddress(String),

    // ============ Field Validation Errors ============
    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Reserved name: {0}")]
    ReservedName(String),

    #[error("Invalid url: {0}")]
    InvalidUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // ============ Storage Errors ============
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Index scan interrupted by shutdown")]
    Interrupted,

    #[error("Block {got} is not the index tip {tip}")]
    NotIndexTip { got: u32, tip: u32 },

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    Config(String),

    // ============ General Errors ============
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SafeError {
    pub fn class(&self) -> ErrorClass {
        use SafeError::*;
        match self {
            FieldTooLong { .. } | MalformedPayload(_) | UnknownCommandCode(_) => ErrorClass::Codec,
            Storage(_) | Serialization(_) | Interrupted | NotIndexTip { .. } => ErrorClass::Storage,
            Config(_) | Internal(_) | Other(_) => ErrorClass::Other,
            _ => ErrorClass::Protocol,
        }
    }

    /// Codec and protocol errors only reject the offending command
    pub fn is_recoverable(&self) -> bool {
        matches!(self.class(), ErrorClass::Codec | ErrorClass::Protocol)
    }

    /// Stable RPC error number presented to wallet and RPC callers
    pub fn rpc_code(&self) -> i32 {
        use SafeError::*;
        match self {
            NonexistentAppId(_) => -500,
            DuplicateAppId(_) => -501,
            DuplicateAppName(_) => -505,
            NotAppAdmin(_) => -512,
            InvalidAddress(_) => -514,
            AuthAlreadyGranted { .. } => -518,
            NonexistentAuth { .. } => -519,
            InsufficientAuth { .. } => -520,
            NotAssetIssuer(_) => -521,
            MalformedPayload(_) | UnknownCommandCode(_) => -522,
            FieldTooLong { .. } | InvalidField { .. } | ReservedName(_) | InvalidUrl(_) => -523,
            DuplicateShortName(_) => -601,
            DuplicateAssetName(_) => -603,
            FirstExceedsTotal { .. } => -608,
            CandyExceedsFirst { .. } => -612,
            DuplicateAssetId(_) => -615,
            NonexistentAssetId(_) => -616,
            ExceedsTotalAmount { .. } => -618,
            DestroyDisabled(_) => -619,
            CandyOfferLimitReached { .. } | NonexistentCandyOffer(_) => -622,
            CandyExpired(_) | CandyNotClaimable(_) | CandyAlreadyClaimed { .. } => -622,
            CandyBudgetExceeded { .. } => -628,
            DuplicateAccountName(_) | DuplicateAccountAddress(_) => -700,
            _ => -1,
        }
    }
}

impl From<std::io::Error> for SafeError {
    fn from(err: std::io::Error) -> Self {
        SafeError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for SafeError {
    fn from(err: bincode::Error) -> Self {
        SafeError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for SafeError {
    fn from(err: serde_json::Error) -> Self {
        SafeError::Serialization(err.to_string())
    }
}
