#![allow(dead_code)]

use std::io;
use std::net;
use std::num::{ParseFloatError, ParseIntError};
use std::string::FromUtf8Error;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("buffer: short")]
    ErrBufferShort,
    #[error("packet too big")]
    ErrPacketTooBig,
    #[error("i/o timeout")]
    ErrTimeout,

    //STUN errors
    #[error("unexpected EOF: not enough bytes to read header")]
    ErrUnexpectedHeaderEof,
    #[error("{0:x} is invalid magic cookie (should be 2112a442)")]
    ErrInvalidMagicCookie(u32),
    #[error("buffer length {0} does not match header length {1}")]
    ErrBufferLengthMismatch(usize, usize),
    #[error("attribute not found")]
    ErrAttributeNotFound,
    #[error("attribute size is invalid")]
    ErrAttributeSizeInvalid,
    #[error("attribute size overflow")]
    ErrAttributeSizeOverflow,
    #[error("bad IP length")]
    ErrBadIpLength,
    #[error("invalid family {0:#04x}")]
    ErrInvalidFamily(u8),
    #[error("no default reason for ErrorCode")]
    ErrNoDefaultReason,
    #[error("invalid error code class {0}")]
    ErrInvalidErrorCodeClass(u16),
    #[error("unexpected response type")]
    ErrUnexpectedResponse,
    #[error("stun request manager is closed")]
    ErrRequestManagerClosed,
    #[error("duplicated transaction id")]
    ErrDuplicatedTransactionId,

    //Socket errors
    #[error("udp socket creation failed")]
    ErrSocketCreationFailed,
    #[error("async resolver creation failed")]
    ErrResolverCreationFailed,
    #[error("socket is not bound")]
    ErrSocketNotBound,
    #[error("socket is closed")]
    ErrSocketClosed,
    #[error("socket send failed with error {0}")]
    ErrSocketSend(i32),
    #[error("socket option {0} is not supported")]
    ErrSocketOptionNotSupported(String),

    //Port errors
    #[error("port has not been initialized")]
    ErrPortNotInitialized,
    #[error("port is closed")]
    ErrPortClosed,
    #[error("port is already initialized")]
    ErrPortAlreadyInitialized,
    #[error("no connection to remote address")]
    ErrNoConnection,
    #[error("connection already exists")]
    ErrConnectionExists,
    #[error("unsupported candidate protocol {0}")]
    ErrUnsupportedProtocol(String),
    #[error("remote address family is incompatible with the port")]
    ErrIncompatibleAddress,
    #[error("shared socket port cannot create connections from a non-host candidate")]
    ErrSharedSocketNotHost,

    //ICE errors
    #[error("invalid ICE ufrag length {0}")]
    ErrInvalidIceUfragLength(usize),
    #[error("invalid ICE pwd length {0}")]
    ErrInvalidIcePwdLength(usize),
    #[error("ICE ufrag is empty")]
    ErrIceUfragEmpty,
    #[error("ICE pwd is empty")]
    ErrIcePwdEmpty,
    #[error("local transport description is not set")]
    ErrNoLocalDescription,
    #[error("remote transport description is not set")]
    ErrNoRemoteDescription,
    #[error("candidate has unresolved address")]
    ErrUnresolvedCandidateAddress,
    #[error("candidate has zero address")]
    ErrZeroCandidateAddress,
    #[error("candidate has port {0} below 1024, but not 80 or 443")]
    ErrLowCandidatePort(u16),
    #[error("candidate has port {0} below 1024 on a private address")]
    ErrPrivateLowCandidatePort(u16),
    #[error("candidate has unknown component {0}")]
    ErrUnknownComponent(u16),
    #[error("unknown channel name {0}")]
    ErrUnknownChannelName(String),
    #[error("candidate is missing attribute {0}")]
    ErrMissingCandidateAttribute(String),
    #[error("candidate preference {0} is invalid")]
    ErrInvalidPreference(String),
    #[error("channel for component {0} does not exist")]
    ErrChannelNotFound(u16),
    #[error("transport is destroyed")]
    ErrTransportDestroyed,
    #[error("invalid connection role {0}")]
    ErrInvalidConnectionRole(String),
    #[error("invalid fingerprint {0}")]
    ErrInvalidFingerprint(String),

    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("parse float: {0}")]
    ParseFloat(#[from] ParseFloatError),
    #[error("parse addr: {0}")]
    ParseIp(#[from] net::AddrParseError),
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("utf8: {0}")]
    Utf8(#[from] FromUtf8Error),

    //Other Errors
    #[error("Other STUN Err: {0}")]
    OtherStunErr(String),
    #[error("Other ICE Err: {0}")]
    OtherIceErr(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}

/// flatten_errs flattens multiple errors into one
pub fn flatten_errs(errs: Vec<impl Into<Error>>) -> Result<()> {
    if errs.is_empty() {
        Ok(())
    } else {
        let errs_strs: Vec<String> = errs.into_iter().map(|e| e.into().to_string()).collect();
        Err(Error::Other(errs_strs.join("\n")))
    }
}
