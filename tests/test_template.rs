mod common;

use common::{config, decode_chunked, server_with, server_with_chunks, split_response};
use ember::template::TemplateError;
use ember::{Error, Read, Server, State};

const GET_ROOT: &[u8] = b"GET / HTTP/1.1\r\nHost: example.com\r\nX-Test: yes\r\n\r\n";

fn render(server: &mut Server, source: &'static str) -> ember::Result<()> {
    let template = server.compile(source)?;
    assert!(matches!(server.read()?, Read::Request(_)));
    server.set_status(200, "OK")?;
    server.render_template(&template)
}

#[test]
fn test_unregistered_function_renders_placeholder() {
    let (mut server, clients) = server_with(&[GET_ROOT]);

    render(&mut server, "a<!--hst f -->b").unwrap();

    let response = clients[0].response();
    let (head, body) = split_response(&response);
    assert_eq!(body, "a<span>undefined template function: 'f'</span>b");
    assert!(head.contains(&format!("Content-Length: {}", body.len())));
    assert_eq!(server.state(), State::AwaitingRequest);
}

#[test]
fn test_registered_function_output_is_spliced() {
    let (mut server, clients) = server_with(&[GET_ROOT]);

    server
        .register_function("f", |server| server.write_body_text("X"))
        .unwrap();
    render(&mut server, "a<!--hst f -->b").unwrap();

    let response = clients[0].response();
    let (_, body) = split_response(&response);
    assert_eq!(body, "aXb");
}

#[test]
fn test_function_registered_after_compile() {
    let (mut server, clients) = server_with(&[GET_ROOT]);

    let template = server.compile("[<!--hst late -->]").unwrap();
    server
        .register_function("late", |server| server.write_body_text("bound"))
        .unwrap();

    assert!(matches!(server.read().unwrap(), Read::Request(_)));
    server.set_status(200, "OK").unwrap();
    server.render_template(&template).unwrap();

    let response = clients[0].response();
    assert_eq!(split_response(&response).1, "[bound]");
}

#[test]
fn test_function_reads_request() {
    let (mut server, clients) = server_with(&[GET_ROOT]);

    server
        .register_function("headers", |server| {
            let headers: Vec<String> = server
                .request()
                .map(|req| req.headers().map(|h| format!("{}={}", h.name, h.value)).collect())
                .unwrap_or_default();
            server.write_body_text(&headers.join(";"))
        })
        .unwrap();
    render(&mut server, "<!--hst headers -->").unwrap();

    let response = clients[0].response();
    assert_eq!(split_response(&response).1, "Host=example.com;X-Test=yes");
}

#[test]
fn test_register_twice_fails() {
    let (mut server, _clients) = server_with(&[]);

    server.register_function("f", |server| server.write_body_text("1")).unwrap();
    let err = server
        .register_function("f", |server| server.write_body_text("2"))
        .unwrap_err();

    assert!(matches!(err, Error::Template(TemplateError::AlreadyRegistered(ref name)) if name == "f"));
}

#[test]
fn test_configuration_closed_after_first_read() {
    let (mut server, _clients) = server_with(&[]);
    assert!(matches!(server.read().unwrap(), Read::Timeout));

    assert!(matches!(
        server.register_function("f", |_| Ok(())),
        Err(Error::State { operation: "register_function", .. })
    ));
    assert!(matches!(
        server.compile("text"),
        Err(Error::State { operation: "compile", .. })
    ));
    assert_eq!(server.state(), State::AwaitingRequest);
}

#[test]
fn test_malformed_marker_fails_compile() {
    let (mut server, _clients) = server_with(&[]);

    assert!(matches!(
        server.compile("<p><!--hst broken"),
        Err(Error::Template(TemplateError::Unterminated { offset: 3 }))
    ));
}

#[test]
fn test_template_from_another_server_is_refused() {
    let (mut other, _) = server_with(&[]);
    let foreign = other.compile("from elsewhere").unwrap();

    let (mut server, clients) = server_with(&[GET_ROOT]);
    assert!(matches!(server.read().unwrap(), Read::Request(_)));
    server.set_status(200, "OK").unwrap();

    let err = server.render_template(&foreign).unwrap_err();

    assert!(matches!(err, Error::Template(TemplateError::ForeignTemplate)));
    assert_eq!(server.state(), State::ErrorClosed);
    assert!(clients[0].response().starts_with("HTTP/1.1 500 "));
}

#[test]
fn test_large_template_output_is_chunked() {
    let (mut server, clients) = server_with_chunks(&config(32 * 1024), vec![vec![GET_ROOT.to_vec()]]);

    server
        .register_function("rows", |server| {
            for i in 0..2000 {
                server.write_body_formatted(format_args!("<tr><td>{i:05}</td></tr>\n"))?;
            }
            Ok(())
        })
        .unwrap();
    render(&mut server, "<table>\n<!--hst rows --></table>").unwrap();

    let response = clients[0].response();
    let (head, body) = split_response(&response);
    assert!(head.contains("Transfer-Encoding: chunked"));

    let html = decode_chunked(body);
    assert!(html.starts_with("<table>\n<tr><td>00000</td></tr>\n"));
    assert!(html.ends_with("<tr><td>01999</td></tr>\n</table>"));
    assert_eq!(html.matches("<tr>").count(), 2000);
}

#[test]
fn test_failing_function_aborts_reply() {
    let (mut server, clients) = server_with(&[GET_ROOT, GET_ROOT]);

    server
        .register_function("broken", |server| {
            server.write_body_text("partial")?;
            Err(Error::Internal("handler failed".into()))
        })
        .unwrap();
    let err = render(&mut server, "a<!--hst broken -->b").unwrap_err();

    assert!(matches!(err, Error::Internal(ref msg) if msg == "handler failed"));
    assert_eq!(server.state(), State::ErrorClosed);
    assert_eq!(clients[0].response(), "HTTP/1.1 500 Internal Server Error\r\n\r\n");
    assert!(clients[0].is_closed());

    // the engine keeps serving
    assert!(matches!(server.read().unwrap(), Read::Request(_)));
    assert_eq!(server.state(), State::AwaitingStatus);
}
