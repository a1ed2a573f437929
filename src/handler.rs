use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::classifier::Classifier;
use crate::corpus::{CategoryDocs, Locator, TestCorpus};
use crate::def::{ContentType, Method, Operation};
use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::resource::Resources;

const UNKNOWN_CATEGORY: &str = "[unknown]";

/// Everything a request may touch: the attached model, the test corpus and the UI files.
pub struct State {
    pub classifier: Option<Box<dyn Classifier>>,
    pub corpus: TestCorpus,
    pub resources: Resources,
}

impl State {
    pub fn new(resources: Resources) -> Self {
        Self { classifier: None, corpus: TestCorpus::new(), resources }
    }

    fn classifier(&self) -> Result<&dyn Classifier> {
        self.classifier.as_deref().ok_or(Error::NoModel)
    }
}

#[derive(Serialize)]
struct Info<'a> {
    model_name: String,
    hps: Value,
    categories: Vec<String>,
    docs: &'a BTreeMap<String, CategoryDocs>,
}

/// Reads one request from `stream` and answers it. Unknown operations and
/// failed classifications are dropped without writing anything back.
pub fn handle<S: Read + Write>(state: &State, stream: &mut S) -> Result<()> {
    let request = match Request::read(stream)? {
        Some(request) => request,
        None => return Ok(()),
    };

    let head = &request.head;
    let host = head.headers.get("Host").unwrap_or("-");
    debug!(version = ?head.version, host, "{} {}", head.method, request.target());

    match head.method {
        Method::POST => {
            let operation = Operation::parse(&head.target);
            info!("POST {} ({})", head.target, operation);
            match operation {
                Operation::Ack => ack(stream),
                Operation::Classify => classify(state, stream, &request.body),
                Operation::GetInfo => get_info(state, stream),
                Operation::GetDoc => get_doc(state, stream, &request.body),
                Operation::Unknown => {
                    warn!("no such operation '{}', dropping request", head.target);
                    Ok(())
                }
            }
        }
        Method::GET => get_static(state, stream, &request),
    }
}

fn ack<W: Write>(stream: &mut W) -> Result<()> {
    Response::ok(ContentType::OctetStream, Vec::new()).send(stream)?;
    info!("sending ACK back to client...");
    Ok(())
}

fn classify<W: Write>(state: &State, stream: &mut W, document: &str) -> Result<()> {
    debug!("{}[...]", document.chars().take(50).collect::<String>());
    match state.classifier()?.classify_json(document) {
        Ok(result) => {
            Response::json(&result)?.send(stream)?;
            info!("sending classification result...");
        }
        // the client gets nothing back and the connection is closed by the caller
        Err(e) => error!("{}", e),
    }
    Ok(())
}

fn get_info<W: Write>(state: &State, stream: &mut W) -> Result<()> {
    let classifier = state.classifier()?;
    let mut categories = classifier.categories();
    categories.push(UNKNOWN_CATEGORY.to_string());

    let info = Info {
        model_name: classifier.name(),
        hps: classifier.hyperparameters(),
        categories,
        docs: state.corpus.docs(),
    };
    Response::json(&info)?.send(stream)?;
    info!("sending classifier info...");
    Ok(())
}

fn get_doc<W: Write>(state: &State, stream: &mut W, locator: &str) -> Result<()> {
    let content = state.corpus.resolve(&Locator::parse(locator)?)?;
    Response::json(&json!({ "content": content }))?.send(stream)?;
    info!("sending document content...");
    Ok(())
}

fn get_static<W: Write>(state: &State, stream: &mut W, request: &Request) -> Result<()> {
    let target = request.target();
    if let Some(query) = &target.query {
        debug!("ignoring query '{}'", query);
    }

    let resource = state.resources.resolve(&target.decoded_location());
    match resource.load() {
        Ok(bytes) => {
            Response::ok(resource.content_type(), bytes).send(stream)?;
            info!("GET {} 200 OK", target);
        }
        Err(_) => {
            Response::not_found().send(stream)?;
            info!("GET {} 404 Not Found", target);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassifierError, Ranking};
    use crate::model::KeywordModel;
    use std::fs;
    use std::io::{self, Cursor};

    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Duplex {
        fn new(request: &str) -> Self {
            Self { input: Cursor::new(request.as_bytes().to_vec()), output: Vec::new() }
        }
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Classifier for Broken {
        fn classify(&self, _: &str) -> std::result::Result<Ranking, ClassifierError> {
            Err("model exploded".into())
        }
        fn categories(&self) -> Vec<String> { vec!["a".to_string()] }
        fn hyperparameters(&self) -> Value { json!({}) }
        fn name(&self) -> String { "broken".to_string() }
    }

    fn state(resources: &std::path::Path) -> State {
        let mut categories = BTreeMap::new();
        categories.insert("A".to_string(), vec!["alpha".to_string()]);
        categories.insert("B".to_string(), vec!["beta".to_string()]);
        let mut state = State::new(Resources::new(resources));
        state.classifier = Some(Box::new(KeywordModel::new("letters", categories)));
        state
    }

    fn post(operation: &str, body: &str) -> String {
        format!("POST /{} HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}", operation, body.len(), body)
    }

    fn json_body(output: &[u8]) -> Value {
        let text = String::from_utf8(output.to_vec()).unwrap();
        let (_, body) = text.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn ack_is_empty() {
        let state = state(std::path::Path::new("/nonexistent"));
        let mut stream = Duplex::new(&post("ack", ""));
        handle(&state, &mut stream).unwrap();
        let text = String::from_utf8(stream.output).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(text.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn classify_returns_ranking() {
        let state = state(std::path::Path::new("/nonexistent"));
        let mut stream = Duplex::new(&post("classify", "some%20beta%20text"));
        handle(&state, &mut stream).unwrap();
        assert_eq!(json_body(&stream.output), json!([[1, 1.0], [0, 0.0]]));
    }

    #[test]
    fn failed_classification_sends_nothing() {
        let mut state = state(std::path::Path::new("/nonexistent"));
        state.classifier = Some(Box::new(Broken));
        let mut stream = Duplex::new(&post("classify", "text"));
        handle(&state, &mut stream).unwrap();
        assert!(stream.output.is_empty());
    }

    #[test]
    fn get_info_lists_corpus() {
        let mut state = state(std::path::Path::new("/nonexistent"));
        let classifier = state.classifier.take().unwrap();
        state
            .corpus
            .build_from_memory(&*classifier, vec!["d0".into(), "d1".into()], vec!["A".into(), "B".into()])
            .unwrap();
        state.classifier = Some(classifier);

        let mut stream = Duplex::new(&post("get_info", ""));
        handle(&state, &mut stream).unwrap();
        let info = json_body(&stream.output);
        assert_eq!(info["model_name"], "letters");
        assert_eq!(info["categories"], json!(["A", "B", "[unknown]"]));
        let docs = info["docs"].as_object().unwrap();
        assert_eq!(docs.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(info["docs"]["A"]["path"], json!([":x_test:0"]));
        assert_eq!(info["docs"]["A"]["file"], json!(["doc_0"]));
        assert_eq!(info["docs"]["B"]["clf_result"], json!([2]));
    }

    #[test]
    fn get_doc_resolves_in_memory_document() {
        let mut state = state(std::path::Path::new("/nonexistent"));
        let classifier = state.classifier.take().unwrap();
        state
            .corpus
            .build_from_memory(&*classifier, vec!["d0".into(), "d1".into()], vec!["A".into(), "B".into()])
            .unwrap();
        state.classifier = Some(classifier);

        let mut stream = Duplex::new(&post("get_doc", "%3Ax_test%3A1"));
        handle(&state, &mut stream).unwrap();
        assert_eq!(json_body(&stream.output), json!({ "content": "d1" }));
    }

    #[test]
    fn get_doc_without_in_memory_documents_is_empty() {
        let state = state(std::path::Path::new("/nonexistent"));
        for body in &["%3Ax_test%3A", "%3Ax_test%3Aabc"] {
            let mut stream = Duplex::new(&post("get_doc", body));
            handle(&state, &mut stream).unwrap();
            assert_eq!(json_body(&stream.output), json!({ "content": "" }));
        }
    }

    #[test]
    fn get_doc_keeps_crlf_line_endings() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lines.txt");
        fs::write(&file, "first\r\nsecond\r\n").unwrap();
        let state = state(dir.path());

        let mut stream = Duplex::new(&post("get_doc", &format!("{}:line:0", file.display())));
        handle(&state, &mut stream).unwrap();
        assert_eq!(json_body(&stream.output), json!({ "content": "first\r\n" }));
    }

    #[test]
    fn get_doc_with_missing_file_fails_the_connection() {
        let state = state(std::path::Path::new("/nonexistent"));
        let mut stream = Duplex::new(&post("get_doc", "/nonexistent/doc.txt"));
        assert!(matches!(handle(&state, &mut stream), Err(Error::Io(_))));
        assert!(stream.output.is_empty());
    }

    #[test]
    fn unknown_operation_sends_nothing() {
        let state = state(std::path::Path::new("/nonexistent"));
        let mut stream = Duplex::new(&post("bogus", "x"));
        handle(&state, &mut stream).unwrap();
        assert!(stream.output.is_empty());
    }

    #[test]
    fn static_files_and_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        let state = state(dir.path());

        let mut root = Duplex::new("GET / HTTP/1.1\r\n\r\n");
        handle(&state, &mut root).unwrap();
        let mut index = Duplex::new("GET /index.html?v=1 HTTP/1.1\r\n\r\n");
        handle(&state, &mut index).unwrap();
        assert_eq!(root.output, index.output);
        let text = String::from_utf8(root.output).unwrap();
        assert!(text.contains("Content-Type: text/html\r\n"));
        assert!(text.ends_with("Content-Length: 13\r\n\r\n<html></html>"));

        let mut escape = Duplex::new("GET /../../etc/passwd HTTP/1.1\r\n\r\n");
        handle(&state, &mut escape).unwrap();
        assert!(String::from_utf8(escape.output).unwrap().starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn silent_peer_is_ignored() {
        let state = state(std::path::Path::new("/nonexistent"));
        let mut stream = Duplex::new("");
        handle(&state, &mut stream).unwrap();
        assert!(stream.output.is_empty());
    }
}
