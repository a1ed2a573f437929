use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::io::{self, ErrorKind, Read, Write};

use lazy_static::lazy_static;
use percent_encoding::percent_decode;
use regex::Regex;
use serde::Serialize;

use crate::def::*;

const NEWLINE: &str = "\r\n";
const HEAD_END: &[u8] = b"\r\n\r\n";

/// Size of a single socket read. A request head must fit in it.
pub const RECV_BUFFER: usize = 1024 * 1024;
pub const SERVER_NAME: &str = "clfview";

lazy_static! {
    static ref CONTENT_LENGTH_REGEX: Regex = Regex::new(r"(?i)content-length\s*:\s*(\d+)").unwrap();
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Percent-decodes a request body or path. `+` is left alone.
pub fn url_decode(encoded: &[u8]) -> String {
    percent_decode(encoded).decode_utf8_lossy().into_owned()
}

pub struct Target<'a> {
    pub location: Cow<'a, str>,
    pub query: Option<Cow<'a, str>>,
}

impl<'a> Target<'a> {
    pub fn parse(target: &'a str) -> Self {
        match target.split_once('?') {
            Some((location, query)) => Self { location: Cow::Borrowed(location), query: Some(Cow::Borrowed(query)) },
            None => Self { location: Cow::Borrowed(target), query: None },
        }
    }

    pub fn decoded_location(&self) -> String {
        url_decode(self.location.as_bytes())
    }
}

impl<'a> Display for Target<'a> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match &self.query {
            Some(query) => write!(f, "{}?{}", self.location, query),
            None => write!(f, "{}", self.location),
        }
    }
}

pub struct Headline<'a>(&'a str, &'a str, Option<&'a str>);

impl<'a> Headline<'a> {
    pub fn parse(line: &'a str) -> Result<Self, ParsingError> {
        let mut parts = line.split_whitespace();
        let first = parts.next().ok_or(ParsingError::Head)?;
        let second = parts.next().ok_or(ParsingError::Head)?;

        Ok(Headline(first, second, parts.next()))
    }

    pub fn construct(first: impl Display, second: impl Display, third: impl Display) -> Vec<u8> {
        format!("{} {} {}{}", first, second, third, NEWLINE).into_bytes()
    }
}

/// Headers in the order they were added or received.
pub struct Headers<'a>(Vec<Header<'a>>);

impl<'a> Headers<'a> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn add(&mut self, header: Header<'a>) {
        self.0.push(header);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|h| h.name.eq_ignore_ascii_case(name)).map(|h| &h.value as &str)
    }

    pub fn list(&self) -> std::slice::Iter<Header<'a>> {
        self.0.iter()
    }

    pub fn construct(&self) -> Vec<u8> {
        let mut headers = Vec::new();
        for header in self.list() {
            headers.extend(header.construct().as_bytes());
            headers.extend(NEWLINE.as_bytes());
        }

        headers
    }
}

impl Headers<'static> {
    pub fn parse<'b>(lines: impl Iterator<Item = &'b str>) -> Self {
        let mut headers = Self::new();
        for line in lines.filter(|l| !l.is_empty()) {
            if let Some(header) = Header::parse(line) {
                headers.add(header);
            }
        }

        headers
    }
}

impl<'a> Default for Headers<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// Case-insensitive `Content-Length` search over a request head; 0 if absent or unparsable.
pub fn content_length(head: &str) -> usize {
    CONTENT_LENGTH_REGEX
        .captures(head)
        .and_then(|c| c[1].parse::<usize>().ok())
        .unwrap_or(0)
}

pub struct RequestHead {
    pub method: Method,
    pub target: String,
    pub version: Option<Version>,
    pub headers: Headers<'static>,
    pub content_length: usize,
}

impl RequestHead {
    /// Splits `data` at the first blank line and parses what precedes it.
    /// Returns the head together with the body bytes that arrived with it.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), ParsingError> {
        if data.is_empty() { return Err(ParsingError::Empty) }
        let (head, body) = match find(data, HEAD_END) {
            Some(index) => (&data[..index], &data[(index + HEAD_END.len())..]),
            None => (data, &data[data.len()..]),
        };

        let text = String::from_utf8_lossy(head);
        let mut lines = text.lines();
        let Headline(method, target, version) = Headline::parse(lines.next().ok_or(ParsingError::Head)?)?;

        let head = Self {
            // anything that is not a POST is served as a static file
            method: Method::parse(method).unwrap_or(Method::GET),
            target: target.to_string(),
            version: version.and_then(Version::parse),
            content_length: content_length(&text),
            headers: Headers::parse(lines),
        };

        Ok((head, body))
    }
}

pub struct Request {
    pub head: RequestHead,
    /// Percent-decoded body; always empty for GET.
    pub body: String,
}

impl Request {
    /// Reads one request from `reader`. `Ok(None)` means the peer sent nothing.
    pub fn read<R: Read>(reader: &mut R) -> crate::Result<Option<Self>> {
        let data = read_head(reader)?;
        if data.is_empty() { return Ok(None) }

        let (head, partial) = RequestHead::parse(&data)?;
        let body = match head.method {
            Method::POST => read_full_body(reader, partial.to_vec(), head.content_length)?,
            Method::GET => String::new(),
        };

        Ok(Some(Self { head, body }))
    }

    pub fn target(&self) -> Target {
        Target::parse(&self.head.target)
    }
}

fn read_head<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut buffer = vec![0u8; RECV_BUFFER];

    while data.len() < RECV_BUFFER {
        match reader.read(&mut buffer[..(RECV_BUFFER - data.len())]) {
            Ok(0) => break,
            Ok(n) => {
                data.extend_from_slice(&buffer[..n]);
                if find(&data, HEAD_END).is_some() { break }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(data)
}

/// Keeps reading until at least `length` body bytes are held, then percent-decodes them.
/// Blocks for as long as the peer keeps the connection open without sending.
pub fn read_full_body<R: Read>(reader: &mut R, mut body: Vec<u8>, length: usize) -> io::Result<String> {
    if body.len() < length {
        let mut buffer = vec![0u8; RECV_BUFFER];
        while body.len() < length {
            match reader.read(&mut buffer) {
                Ok(0) => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("peer closed after {} of {} body bytes", body.len(), length),
                    ))
                }
                Ok(n) => body.extend_from_slice(&buffer[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    Ok(url_decode(&body))
}

pub struct Response<'a> {
    pub version: Version,
    pub status: Status,
    pub headers: Headers<'a>,
    pub payload: Cow<'a, [u8]>,
}

impl<'a> Response<'a> {
    pub fn new(status: Status) -> Self {
        let mut headers = Headers::new();
        headers.add(Header::from(Connection::Close));
        Self { version: Version::V11, status, headers, payload: Cow::Borrowed(&[]) }
    }

    pub fn ok<P: Into<Cow<'a, [u8]>>>(content_type: ContentType, payload: P) -> Self {
        let mut response = Self::new(Status::Ok);
        response.headers.add(Header::new("Access-Control-Allow-Origin", "*"));
        response.headers.add(Header::new("Server", SERVER_NAME));
        response.headers.add(Header::from(content_type));
        response.payload = payload.into();
        response
    }

    pub fn not_found() -> Self {
        let mut response = Self::new(Status::NotFound);
        response.headers.add(Header::new("Server", SERVER_NAME));
        response
    }

    pub fn construct(&self) -> Vec<u8> {
        let mut response = Headline::construct(self.version, self.status, self.status.message());
        response.extend(self.headers.construct());
        response.extend(Header::new("Content-Length", self.payload.len().to_string()).construct().as_bytes());
        response.extend(NEWLINE.as_bytes());
        response.extend(NEWLINE.as_bytes());
        response.extend(self.payload.iter());
        response
    }

    pub fn send<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.construct())?;
        writer.flush()
    }
}

impl Response<'static> {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        Ok(Self::ok(ContentType::Json, serde_json::to_vec(value)?))
    }
}
