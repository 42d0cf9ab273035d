use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use ember::{Config, Method, Read, Server, StatusCode, Template};
use tracing::{info, warn};

const MAIN_PAGE: &str = "<!DOCTYPE html>\r\n\
<html>\r\n\
<head>\r\n\
  <title>Ember</title>\r\n\
</head>\r\n\
<body>\r\n\
  <h1>Ember server demo.</h1>\r\n\
  <p>This is request number <!--hst req_number -->.</p>\r\n\
  <p>Server uptime is <!--hst uptime --> seconds.</p>\r\n\
  <h3>Request headers:</h3>\r\n\
  <!--hst show_headers -->\r\n\
</body>\r\n\
</html>\r\n";

enum Route {
    Root,
    Exit,
    NotFound,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let config = Config::load()?;
    let mut server = Server::bind(&config)?;

    let handled = Rc::new(Cell::new(0u64));
    let started = Instant::now();

    let count = Rc::clone(&handled);
    server.register_function("req_number", move |server| {
        server.write_body_formatted(format_args!("{}", count.get()))
    })?;
    server.register_function("uptime", move |server| {
        server.write_body_formatted(format_args!("{}", started.elapsed().as_secs()))
    })?;
    server.register_function("show_headers", show_headers)?;

    let page = server.compile(MAIN_PAGE)?;

    loop {
        let route = match server.read()? {
            Read::Request(request) => match (request.method(), request.segment(0)) {
                (Method::GET | Method::HEAD, None) => Route::Root,
                (Method::GET, Some("exit")) if request.path_len() == 1 => Route::Exit,
                _ => Route::NotFound,
            },
            Read::Timeout | Read::Continue => continue,
        };

        let result = match route {
            Route::Root => {
                handled.set(handled.get() + 1);
                root(&mut server, &page)
            }
            Route::Exit => {
                let sent = plain(&mut server, StatusCode::Ok, "Server shutdown.");
                if let Err(e) = sent {
                    warn!(error = %e, "reply failed");
                }
                break;
            }
            Route::NotFound => plain(&mut server, StatusCode::NotFound, "Page not found."),
        };

        if let Err(e) = result {
            warn!(error = %e, "reply failed");
        }
    }

    server.teardown();
    info!("Shutdown complete");
    Ok(())
}

fn root(server: &mut Server, page: &Template<'_>) -> ember::Result<()> {
    server.set_status_code(StatusCode::Ok)?;
    server.add_header("Content-Type", "text/html")?;
    server.render_template(page)
}

fn plain(server: &mut Server, status: StatusCode, text: &str) -> ember::Result<()> {
    server.set_status_code(status)?;
    server.add_header("Content-Type", "text/plain")?;
    server.write_body_text(text)?;
    server.finish()
}

fn show_headers(server: &mut Server) -> ember::Result<()> {
    let headers: Vec<(String, String)> = match server.request() {
        Some(request) => request
            .headers()
            .map(|h| (h.name.to_owned(), h.value.to_owned()))
            .collect(),
        None => return Ok(()),
    };

    for (name, value) in headers {
        server.write_body_formatted(format_args!("<p>{name}: {value}</p>\r\n"))?;
    }
    Ok(())
}
