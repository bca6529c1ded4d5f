use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;

mod config;
mod http_error;
mod routers;
mod state;
mod time;

use config::ServiceConfig;
use state::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt().init();
    dotenvy::dotenv().ok();

    let service_config = ServiceConfig::init();
    let addr: SocketAddr = service_config.addr.parse().unwrap();
    let addr_redir_str = service_config.http_redirect_addr.clone();

    let app_state = web::Data::new(AppState::new(&service_config));

    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .service(web::scope("").configure(routers::write::configure))
            .service(
                web::scope("")
                    .wrap(routers::read::cors())
                    .configure(routers::read::configure),
            )
    });

    if let Some(tls_config) = load_tls(&service_config.cert_path, &service_config.key_path) {
        let http_redirect_addr: SocketAddr = addr_redir_str.parse().unwrap();
        let https_port = addr.port();

        tracing::info!(%addr, "starting HTTPS server");
        tracing::info!(%http_redirect_addr, "starting HTTP redirect server");

        let https_server = server.bind_rustls_0_23(addr, tls_config)?.run();

        let redirect_server = HttpServer::new(move || {
            App::new().default_service(web::to(move |req: HttpRequest| {
                redirect_to_https(req, https_port)
            }))
        })
        .bind(http_redirect_addr)?
        .run();

        tokio::try_join!(https_server, redirect_server)?;
        Ok(())
    } else {
        tracing::info!(%addr, "starting plain HTTP server");
        server.bind(addr)?.run().await
    }
}

async fn redirect_to_https(req: HttpRequest, https_port: u16) -> HttpResponse {
    let host = req.connection_info().host().to_string();
    let authority = build_https_authority(&host, https_port);
    let location = format!("https://{authority}{}", req.uri());

    HttpResponse::PermanentRedirect()
        .insert_header(("Location", location))
        .finish()
}

fn build_https_authority(host: &str, https_port: u16) -> String {
    if let Ok(authority) = host.parse::<actix_web::http::uri::Authority>() {
        let parsed_host = authority.host();
        let rendered_host = if parsed_host.contains(':') {
            format!("[{parsed_host}]")
        } else {
            parsed_host.to_string()
        };

        if https_port == 443 {
            rendered_host
        } else {
            format!("{rendered_host}:{https_port}")
        }
    } else if https_port == 443 {
        host.to_string()
    } else {
        format!("{host}:{https_port}")
    }
}

fn load_tls(cert_path: &str, key_path: &str) -> Option<ServerConfig> {
    let mut cert_reader = BufReader::new(File::open(cert_path).ok()?);
    let mut key_reader = BufReader::new(File::open(key_path).ok()?);

    let cert_chain: Vec<CertificateDer<'static>> =
        certs(&mut cert_reader).collect::<Result<_, _>>().ok()?;

    let mut keys = pkcs8_private_keys(&mut key_reader)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    let key = keys.pop()?;
    let key: PrivateKeyDer<'static> = key.into();

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .ok()?;

    Some(config)
}
