use std::borrow::Cow;
use std::error::Error;
use std::fmt::{self, Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    GET,
    POST,
}

impl Method {
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_uppercase().as_str() {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            _ => None,
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Method::GET => write!(f, "GET"),
            Method::POST => write!(f, "POST"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Version {
    V1,
    V11,
}

impl Version {
    pub fn parse(version: &str) -> Option<Self> {
        match version {
            "HTTP/1.0" => Some(Version::V1),
            "HTTP/1.1" => Some(Version::V11),
            _ => None,
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Version::V1 => write!(f, "HTTP/1.0"),
            Version::V11 => write!(f, "HTTP/1.1"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
}

impl Status {
    pub fn message(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::NotFound => "Not Found",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "200"),
            Status::NotFound => write!(f, "404"),
        }
    }
}

/// Something that renders as a single well-known header.
pub trait ToHeader {
    fn normalized() -> &'static str;
    fn value(&self) -> &'static str;
}

pub struct Header<'a> {
    pub name: Cow<'a, str>,
    pub value: Cow<'a, str>,
}

impl<'a> Header<'a> {
    pub fn new<N: Into<Cow<'a, str>>, V: Into<Cow<'a, str>>>(name: N, value: V) -> Self {
        Self { name: name.into(), value: value.into() }
    }

    pub fn from<T: ToHeader>(to_header: T) -> Self {
        Self::new(T::normalized(), to_header.value())
    }

    pub fn parse(header: &str) -> Option<Header<'static>> {
        match header.find(':') {
            Some(colon_index) => Some(Header::new(
                header[..colon_index].trim().to_string(),
                header[(colon_index + 1)..].trim().to_string(),
            )),
            None => None,
        }
    }

    pub fn construct(&self) -> String {
        format!("{}: {}", self.name, self.value)
    }
}

const CONTENT_TYPE_HTML: &str = "text/html";
const CONTENT_TYPE_CSS: &str = "text/css";
const CONTENT_TYPE_JAVASCRIPT: &str = "application/javascript";
const CONTENT_TYPE_PNG: &str = "image/png";
const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_ICON: &str = "image/vnd.microsoft.icon";
const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    Html,
    Css,
    JavaScript,
    Png,
    Json,
    Icon,
    OctetStream,
}

impl ContentType {
    /// Unknown extensions fall back to `application/octet-stream`.
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_lowercase().as_str() {
            "html" => ContentType::Html,
            "css" => ContentType::Css,
            "js" => ContentType::JavaScript,
            "png" => ContentType::Png,
            "json" => ContentType::Json,
            "ico" => ContentType::Icon,
            _ => ContentType::OctetStream,
        }
    }
}

impl ToHeader for ContentType {
    fn normalized() -> &'static str { "Content-Type" }
    fn value(&self) -> &'static str {
        match self {
            ContentType::Html => CONTENT_TYPE_HTML,
            ContentType::Css => CONTENT_TYPE_CSS,
            ContentType::JavaScript => CONTENT_TYPE_JAVASCRIPT,
            ContentType::Png => CONTENT_TYPE_PNG,
            ContentType::Json => CONTENT_TYPE_JSON,
            ContentType::Icon => CONTENT_TYPE_ICON,
            ContentType::OctetStream => CONTENT_TYPE_OCTET_STREAM,
        }
    }
}

const CONNECTION_CLOSE: &str = "close";

// Every connection carries exactly one request.
pub enum Connection {
    Close,
}

impl ToHeader for Connection {
    fn normalized() -> &'static str { "Connection" }
    fn value(&self) -> &'static str {
        match self {
            Connection::Close => CONNECTION_CLOSE,
        }
    }
}

/// POST control operations, keyed by the request path minus its first character.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Ack,
    Classify,
    GetInfo,
    GetDoc,
    /// Anything else; the request is read and then dropped without a response.
    Unknown,
}

impl Operation {
    pub fn parse(target: &str) -> Self {
        let mut name = target.chars();
        name.next();
        match name.as_str() {
            "ack" => Operation::Ack,
            "classify" => Operation::Classify,
            "get_info" => Operation::GetInfo,
            "get_doc" => Operation::GetDoc,
            _ => Operation::Unknown,
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Operation::Ack => write!(f, "ack"),
            Operation::Classify => write!(f, "classify"),
            Operation::GetInfo => write!(f, "get_info"),
            Operation::GetDoc => write!(f, "get_doc"),
            Operation::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsingError {
    Head,
    Empty,
}

impl Display for ParsingError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Error for ParsingError { }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(ContentType::from_extension("xyz").value(), "application/octet-stream");
        assert_eq!(ContentType::from_extension("").value(), "application/octet-stream");
    }

    #[test]
    fn json_extension_is_application_json() {
        assert_eq!(ContentType::from_extension("json").value(), "application/json");
        assert_eq!(ContentType::from_extension("JSON"), ContentType::Json);
    }

    #[test]
    fn operation_strips_first_character() {
        assert_eq!(Operation::parse("/ack"), Operation::Ack);
        assert_eq!(Operation::parse("/classify"), Operation::Classify);
        assert_eq!(Operation::parse("/get_info"), Operation::GetInfo);
        assert_eq!(Operation::parse("/get_doc"), Operation::GetDoc);
        assert_eq!(Operation::parse("/bogus"), Operation::Unknown);
        assert_eq!(Operation::parse("/ack/"), Operation::Unknown);
        assert_eq!(Operation::parse(""), Operation::Unknown);
    }

    #[test]
    fn header_parse_trims_both_sides() {
        let header = Header::parse("Content-Length :  12 ").unwrap();
        assert_eq!(header.name, "Content-Length");
        assert_eq!(header.value, "12");
        assert!(Header::parse("no colon here").is_none());
    }

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!(Method::parse("post"), Some(Method::POST));
        assert_eq!(Method::parse("PUT"), None);
    }
}
