// single-threaded: one readiness wait for the whole process, and each
// readable connection is served to completion (blocking) before the next event

use std::collections::HashMap;
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{error, info, warn};

use crate::classifier::Classifier;
use crate::corpus::TestCorpus;
use crate::error::{Error, Result};
use crate::handler::{self, State};
use crate::resource::Resources;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const STREAM: Token = Token(0);
const BACKLOG_EVENTS: usize = 128;

/// Stops a running [`Server::serve`] loop from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) -> io::Result<()> {
        self.requested.store(true, Ordering::SeqCst);
        self.waker.wake()
    }
}

/// A non-blocking connection made to look blocking: reads and writes that
/// would block park on a private poll until the socket is ready again.
struct BlockingStream {
    stream: TcpStream,
    poll: Poll,
    events: Events,
}

impl BlockingStream {
    fn new(mut stream: TcpStream) -> io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry().register(&mut stream, STREAM, Interest::READABLE | Interest::WRITABLE)?;
        Ok(Self { stream, poll, events: Events::with_capacity(8) })
    }

    fn wait(&mut self) -> io::Result<()> {
        match self.poll.poll(&mut self.events, None) {
            Err(e) if e.kind() != ErrorKind::Interrupted => Err(e),
            _ => Ok(()),
        }
    }
}

impl Read for BlockingStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.stream.read(buf) {
                Err(e) if e.kind() == ErrorKind::WouldBlock => self.wait()?,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }
}

impl Write for BlockingStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.stream.write(buf) {
                Err(e) if e.kind() == ErrorKind::WouldBlock => self.wait()?,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        loop {
            match self.stream.flush() {
                Err(e) if e.kind() == ErrorKind::WouldBlock => self.wait()?,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }
}

pub struct Server {
    state: State,
    port: u16,
    listener: Option<TcpListener>,
    poll: Poll,
    waker: Arc<Waker>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// A server without a model, serving UI files from `resources`.
    pub fn new<P: Into<PathBuf>>(resources: P) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        Ok(Self {
            state: State::new(Resources::new(resources)),
            port: 0,
            listener: None,
            poll,
            waker,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The bound port, or 0 before [`Server::start_listening`].
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn corpus(&self) -> &TestCorpus {
        &self.state.corpus
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { waker: Arc::clone(&self.waker), requested: Arc::clone(&self.shutdown) }
    }

    /// Attaches a model, dropping any test set built with the previous one.
    pub fn set_model(&mut self, classifier: Box<dyn Classifier>) {
        self.state.classifier = Some(classifier);
        self.clear_testset();
    }

    pub fn clear_testset(&mut self) {
        self.state.corpus.clear();
    }

    pub fn set_testset(&mut self, documents: Vec<String>, labels: Vec<String>) -> Result<bool> {
        let classifier = self.state.classifier.as_deref().ok_or(Error::NoModel)?;
        self.state.corpus.build_from_memory(classifier, documents, labels)
    }

    pub fn set_testset_from_files(&mut self, directory: &Path, group_by_folder: bool) -> Result<bool> {
        let classifier = self.state.classifier.as_deref().ok_or(Error::NoModel)?;
        self.state.corpus.build_from_files(classifier, directory, group_by_folder)
    }

    /// Binds every interface on `port` (0 picks a free one) and returns the bound port.
    pub fn start_listening(&mut self, port: u16) -> io::Result<u16> {
        self.stop_listening();

        let mut listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))?;
        self.poll.registry().register(&mut listener, LISTENER, Interest::READABLE)?;
        self.port = listener.local_addr()?.port();
        self.listener = Some(listener);

        info!("server started (listening on port {})", self.port);
        info!("Copy/paste this URL into your browser http://localhost:{}", self.port);
        Ok(self.port)
    }

    fn stop_listening(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            if let Err(e) = self.poll.registry().deregister(&mut listener) {
                warn!("deregistering listener: {}", e);
            }
        }
    }

    /// Serves requests until shut down through a [`ShutdownHandle`]. The
    /// listening socket is closed on return; calling `serve` again starts over.
    pub fn serve(
        &mut self,
        testset: Option<(Vec<String>, Vec<String>)>,
        port: u16,
        browser: bool,
    ) -> Result<()> {
        if self.state.classifier.is_none() {
            error!("a model must be given before serving");
            return Err(Error::NoModel);
        }

        if self.listener.is_none() {
            self.start_listening(port)?;
        }

        if let Some((documents, labels)) = testset {
            if !documents.is_empty() {
                self.set_testset(documents, labels)?;
            }
        }

        if browser {
            open_browser(&format!("http://localhost:{}", self.port));
        }

        info!("waiting for requests");
        let result = self.run();
        info!("closing server...");
        self.stop_listening();
        result.map_err(Error::from)
    }

    fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(BACKLOG_EVENTS);
        let mut connections: HashMap<Token, TcpStream> = HashMap::new();
        let mut next = WAKER.0 + 1;

        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == ErrorKind::Interrupted { continue }
                return Err(e);
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept(&mut connections, &mut next),
                    WAKER => {
                        if self.shutdown.swap(false, Ordering::SeqCst) {
                            return Ok(());
                        }
                    }
                    token => {
                        if let Some(stream) = connections.remove(&token) {
                            self.respond(stream);
                        }
                    }
                }
            }
        }
    }

    fn accept(&self, connections: &mut HashMap<Token, TcpStream>, next: &mut usize) {
        let listener = match &self.listener {
            Some(listener) => listener,
            None => return,
        };

        loop {
            match listener.accept() {
                Ok((mut stream, address)) => {
                    let token = Token(*next);
                    *next += 1;
                    if let Err(e) = self.poll.registry().register(&mut stream, token, Interest::READABLE) {
                        warn!("dropping connection from {}: {}", address, e);
                        continue;
                    }
                    info!("[ {} ] connected", address.ip());
                    connections.insert(token, stream);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    return;
                }
            }
        }
    }

    /// Handles the one request a connection carries, then closes it.
    fn respond(&self, mut stream: TcpStream) {
        if let Err(e) = self.poll.registry().deregister(&mut stream) {
            warn!("deregistering connection: {}", e);
        }

        let result = BlockingStream::new(stream)
            .map_err(Error::from)
            .and_then(|mut stream| handler::handle(&self.state, &mut stream));
        if let Err(e) = result {
            warn!("dropping connection: {}", e);
        }
    }
}

fn open_browser(url: &str) {
    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(&["/C", "start"]);
        command
    } else {
        Command::new("xdg-open")
    };

    if let Err(e) = command.arg(url).spawn() {
        warn!("could not open a browser: {}", e);
    }
}
