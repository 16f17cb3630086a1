use std::io::Cursor;
use std::thread;

use vmdbg::client::{ClientExit, ClientSession};
use vmdbg::code::{CodeObject, Constant, LineTable};
use vmdbg::processor::{CommandProcessor, DebuggeeState};
use vmdbg::render::HighlightStyle;
use vmdbg::session::ServerInterface;
use vmdbg::settings::Settings;
use vmdbg::transport::{TcpTransport, Transport};
use vmdbg::{Frame, Role};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn debuggee() -> DebuggeeState {
    let mut code = CodeObject::new("main", vec![100, 0, 0, 125, 0, 0, 124, 0, 0, 83]);
    code.filename = "main.py".into();
    code.first_line = 1;
    code.consts = vec![Constant::Str("hi".into())];
    code.varnames = vec!["greeting".into()];
    code.line_table = LineTable::from_pairs(vec![(0, 1), (6, 2)]);

    let mut debuggee = DebuggeeState::default();
    debuggee.sources.insert("main.py", "greeting = 'hi'\nreturn greeting\n");
    debuggee.stop_at(code, 6);
    debuggee
}

/// Run a debugger over `transport` until the front end is done.
fn serve<T: Transport>(transport: T) {
    let settings = Settings {
        highlight: HighlightStyle::Plain,
        ..Settings::default()
    };
    let mut processor = CommandProcessor::with_default_commands(settings, debuggee()).unwrap();
    let mut intf = ServerInterface::connect(transport).unwrap();
    processor.run(&mut intf).unwrap();
    intf.finalize();
}

const SCRIPT: &str = "disassemble\nlist 1 2\nset skip off\nshow skip\nfrobnicate\nquit\nmaybe\ny\n";

fn check_transcript(exit: ClientExit, output: &str) {
    assert_eq!(exit, ClientExit::ServerQuit);
    assert!(output.starts_with("(vmdbg) Disassembly of <code object main, file \"main.py\", line 1>:\n"));
    assert!(output.contains("('hi')"));
    assert!(output.contains("  2  ->\treturn greeting\n"));
    assert!(output.contains("skip is off.\n"));
    assert!(output.contains("** Undefined command: \"frobnicate\". Try \"help\".\n"));
    assert!(output.contains("Really quit? (y or n) Please answer y or n.\nReally quit? (y or n) "));
}

#[test]
fn tcp_session_end_to_end() {
    init_logging();
    let server = TcpTransport::bind("127.0.0.1:0").unwrap();
    let addr = server.local_addr().unwrap();
    let debugger = thread::spawn(move || serve(server));

    let mut client = ClientSession::connect(TcpTransport::connect_to(addr)).unwrap();
    let mut output = Vec::new();
    let exit = client.run(&mut Cursor::new(SCRIPT), &mut output).unwrap();
    debugger.join().unwrap();

    check_transcript(exit, &String::from_utf8(output).unwrap());
}

#[cfg(unix)]
#[test]
fn pipe_session_end_to_end() {
    use vmdbg::transport::PipeTransport;

    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vmdbg.sock");
    let server = PipeTransport::bind(&path).unwrap();
    let debugger = thread::spawn(move || serve(server));

    let mut client = ClientSession::connect(PipeTransport::connect_to(&path)).unwrap();
    let mut output = Vec::new();
    let exit = client.run(&mut Cursor::new(SCRIPT), &mut output).unwrap();
    debugger.join().unwrap();

    check_transcript(exit, &String::from_utf8(output).unwrap());
}

#[test]
fn debugger_sees_end_of_stream_when_front_end_leaves() {
    init_logging();
    let server = TcpTransport::bind("127.0.0.1:0").unwrap();
    let addr = server.local_addr().unwrap();
    let debugger = thread::spawn(move || serve(server));

    let mut client = ClientSession::connect(TcpTransport::connect_to(addr)).unwrap();
    let exit = client.run(&mut Cursor::new("show skip\n"), &mut Vec::new()).unwrap();
    assert_eq!(exit, ClientExit::InputClosed);
    debugger.join().unwrap();
}

/// Shut `server` down from outside while `confirm` waits for an answer.
fn close_during_confirm<T, C>(server: T, mut front_end: C, default: bool)
where
    T: Transport + 'static,
    C: Transport,
{
    let mut intf = ServerInterface::connect(server).unwrap();
    let closer = intf.connection().closer().unwrap();
    let waiting = thread::spawn(move || {
        let answer = intf.confirm("Really quit?", default).unwrap();
        (answer, intf.is_connected())
    });

    let asked = front_end.receive().unwrap().unwrap();
    assert_eq!(asked, Frame::new(Role::confirm(default), "Really quit?\n"));
    closer.close().unwrap();

    assert_eq!(waiting.join().unwrap(), (default, false));
}

#[test]
fn tcp_closer_ends_blocked_confirm() {
    init_logging();
    let server = TcpTransport::bind("127.0.0.1:0").unwrap();
    let mut front_end = TcpTransport::connect_to(server.local_addr().unwrap());
    front_end.open().unwrap();
    close_during_confirm(server, front_end, true);
}

#[cfg(unix)]
#[test]
fn pipe_closer_ends_blocked_confirm() {
    use vmdbg::transport::PipeTransport;

    init_logging();
    let (server, front_end) = PipeTransport::pair().unwrap();
    close_during_confirm(server, front_end, false);
}
