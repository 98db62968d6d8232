mod fs_util;
mod metrics;
mod net_util;
mod settings;

use bytes::BytesMut;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, UdpSocket};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use zoned_resolver::registry::ZoneRegistry;
use zoned_resolver::rop::TcpRopStore;
use zoned_resolver::targeting::{build_targets, GeoIp, NoGeoIp};
use zoned_resolver::{resolve, ResolvedAnswer};
use zoned_types::protocol::types::*;
use zoned_types::zones::types::{RopStore, Zone};

use crate::fs_util::*;
use crate::metrics::*;
use crate::net_util::*;
use crate::settings::Settings;

async fn resolve_and_build_response(args: &ListenArgs, query: Message, peer: SocketAddr) -> Message {
    let mut response = query.make_response();
    response.header.is_authoritative = true;

    let mut is_refused = false;

    for question in &query.questions {
        DNS_QUESTIONS_TOTAL
            .with_label_values(&[&question.qtype.to_string()])
            .inc();

        // only IN, and only real record types: type 4 is the internal
        // alias slot and never answerable
        if question.qclass != RecordClass::IN
            || question.qtype.is_unknown()
            || question.qtype == RecordType::Alias
        {
            is_refused = true;
            tracing::info!(%question, "refused");
            continue;
        }

        // a query started against this snapshot finishes against it,
        // reload or no reload
        let zone = match args.registry.find(&question.name) {
            Some(zone) => zone,
            None => {
                is_refused = true;
                tracing::info!(%question, "not authoritative");
                continue;
            }
        };

        zone.metrics.queries.fetch_add(1, Ordering::Relaxed);
        ZONE_QUERIES_TOTAL
            .with_label_values(&[&zone.origin().to_string()])
            .inc();

        let client_ip = match &query.edns {
            Some(Edns {
                client_subnet: Some(subnet),
                ..
            }) => subnet.address,
            _ => peer.ip(),
        };
        if query.edns.is_some() {
            zone.metrics.edns_queries.fetch_add(1, Ordering::Relaxed);
            DNS_EDNS_QUERIES_TOTAL.inc();
        }

        let (targets, netmask) =
            build_targets(args.geo.as_ref(), zone.options.targeting, client_ip);
        if let Some(edns) = &mut response.edns {
            if let Some(subnet) = &mut edns.client_subnet {
                subnet.scope_prefix = netmask;
            }
        }

        let mut rng = StdRng::from_entropy();
        let (resolution_metrics, result) = resolve(
            &zone,
            &question.name,
            question.qtype,
            &targets,
            &mut rng,
        )
        .await;
        observe_resolution(&resolution_metrics);

        match result {
            Ok(ResolvedAnswer::Answer { mut rrs }) => {
                if rrs.is_empty() {
                    // NOERROR with the SOA in authority: the name (or a
                    // wildcard for it) exists, the type does not
                    if let Some(soa_rr) = zone.soa_rr() {
                        response.authority.push(soa_rr);
                    }
                } else {
                    response.answers.append(&mut rrs);
                }
                tracing::debug!(%question, %client_ip, answers = %response.answers.len(), "ok");
            }
            Ok(ResolvedAnswer::NameError) => {
                if let Some(soa_rr) = zone.soa_rr() {
                    response.authority.push(soa_rr);
                }
                if query.questions.len() == 1 {
                    response.header.rcode = Rcode::NameError;
                }
                tracing::debug!(%question, %client_ip, "name error");
            }
            Err(error) => {
                tracing::error!(
                    zone = %zone.origin(),
                    %question,
                    %client_ip,
                    %error,
                    "resolution failed"
                );
                response.header.rcode = Rcode::ServerFailure;
                response.header.is_authoritative = false;
            }
        }
    }

    if is_refused {
        response.header.rcode = Rcode::Refused;
        response.header.is_authoritative = false;
    }

    DNS_RESPONSES_TOTAL
        .with_label_values(&[&response.header.rcode.to_string()])
        .inc();

    response
}

/// Parse and answer one raw message.  Returns the response and the
/// largest payload the client can take over UDP.
async fn handle_raw_message(
    args: &ListenArgs,
    buf: &[u8],
    peer: SocketAddr,
) -> Option<(Message, usize)> {
    let res = Message::from_octets(buf);
    tracing::trace!(message = ?res, "got message");

    match res {
        Ok(msg) => {
            let max_payload = msg.edns.as_ref().map_or(UDP_PAYLOAD_DEFAULT, |edns| {
                usize::from(edns.udp_payload_size)
                    .clamp(UDP_PAYLOAD_DEFAULT, usize::from(Edns::RESPONSE_UDP_PAYLOAD_SIZE))
            });

            if msg.header.is_response {
                Some((
                    Message::make_format_error_response(msg.header.id),
                    max_payload,
                ))
            } else if msg.header.opcode == Opcode::Standard {
                Some((
                    resolve_and_build_response(args, msg, peer).await,
                    max_payload,
                ))
            } else {
                let mut response = msg.make_response();
                response.header.rcode = Rcode::NotImplemented;
                Some((response, max_payload))
            }
        }
        Err(err) => err
            .id()
            .map(|id| (Message::make_format_error_response(id), UDP_PAYLOAD_DEFAULT)),
    }
}

async fn listen_tcp_task(args: ListenArgs, socket: TcpListener) {
    loop {
        match socket.accept().await {
            Ok((mut stream, peer)) => {
                tracing::debug!(?peer, "TCP request");
                DNS_REQUESTS_TOTAL.with_label_values(&["tcp"]).inc();
                let args = args.clone();
                tokio::spawn(async move {
                    let response_timer = DNS_RESPONSE_TIME_SECONDS
                        .with_label_values(&["tcp"])
                        .start_timer();
                    let response = match read_tcp_bytes(&mut stream).await {
                        Ok(bytes) => handle_raw_message(&args, bytes.as_ref(), peer).await,
                        Err(error) => {
                            tracing::debug!(?peer, ?error, "TCP read error");
                            error
                                .id()
                                .map(|id| (Message::make_format_error_response(id), 0))
                        }
                    };
                    if let Some((message, _)) = response {
                        match message.to_octets() {
                            Ok(mut serialised) => {
                                if let Err(error) =
                                    send_tcp_bytes(&mut stream, &mut serialised).await
                                {
                                    tracing::debug!(?peer, ?error, "TCP send error");
                                }
                            }
                            Err(error) => {
                                tracing::warn!(?peer, ?message, ?error, "could not serialise message");
                            }
                        }
                    }
                    response_timer.observe_duration();
                });
            }
            Err(error) => tracing::debug!(?error, "TCP accept error"),
        }
    }
}

async fn listen_udp_task(args: ListenArgs, socket: UdpSocket) {
    let (tx, mut rx) = mpsc::channel(32);
    let mut buf = vec![0u8; usize::from(Edns::RESPONSE_UDP_PAYLOAD_SIZE)];

    loop {
        tokio::select! {
            Ok((size, peer)) = socket.recv_from(&mut buf) => {
                tracing::debug!(?peer, "UDP request");
                DNS_REQUESTS_TOTAL.with_label_values(&["udp"]).inc();
                let bytes = BytesMut::from(&buf[..size]);
                let reply = tx.clone();
                let args = args.clone();
                tokio::spawn(async move {
                    let response_timer = DNS_RESPONSE_TIME_SECONDS
                        .with_label_values(&["udp"])
                        .start_timer();
                    if let Some((message, max_payload)) = handle_raw_message(&args, bytes.as_ref(), peer).await {
                        if let Err(error) = reply.send((message, peer, max_payload, response_timer)).await {
                            tracing::debug!(?peer, ?error, "UDP reply channel error");
                        }
                    }
                });
            }

            Some((message, peer, max_payload, response_timer)) = rx.recv() => {
                match message.to_octets() {
                    Ok(mut serialised) => {
                        if let Err(error) =
                            send_udp_bytes_to(&socket, peer, &mut serialised, max_payload).await
                        {
                            tracing::debug!(?peer, ?error, "UDP send error");
                        }
                    }
                    Err(error) => {
                        tracing::warn!(?peer, ?message, ?error, "could not serialise message");
                    }
                }
                response_timer.observe_duration();
            }
        }
    }
}

/// Arguments for `listen_udp_task` and `listen_tcp_task`.
#[derive(Debug, Clone)]
struct ListenArgs {
    registry: Arc<ZoneRegistry>,
    geo: Arc<dyn GeoIp>,
}

/// Load every zone file in the zones directory.  `None` if anything went
/// wrong: a reload must be all-or-nothing.
async fn load_zone_configuration(
    zones_dir: &Path,
    rop: Option<&Arc<dyn RopStore>>,
) -> Option<Vec<Zone>> {
    let mut is_error = false;

    let paths = match get_files_from_dir(zones_dir).await {
        Ok(paths) => paths,
        Err(error) => {
            tracing::warn!(?zones_dir, ?error, "could not read zones directory");
            return None;
        }
    };

    let mut zones = Vec::with_capacity(paths.len());
    for path in &paths {
        match zone_from_file(path).await {
            Ok(Ok(mut zone)) => {
                zone.rop = rop.cloned();
                tracing::info!(zone = %zone.origin(), serial = %zone.options.serial, "loaded zone");
                zones.push(zone);
            }
            Ok(Err(error)) => {
                tracing::warn!(?path, %error, "could not parse zone file");
                is_error = true;
            }
            Err(error) => {
                tracing::warn!(?path, ?error, "could not read zone file");
                is_error = true;
            }
        }
    }

    if is_error {
        None
    } else {
        Some(zones)
    }
}

/// Rebuild and republish the zones on SIGUSR1.  Queries in flight keep
/// the snapshot they started with.
async fn reload_task(registry: Arc<ZoneRegistry>, zones_dir: PathBuf, rop: Option<Arc<dyn RopStore>>) {
    let mut stream = match signal(SignalKind::user_defined1()) {
        Ok(stream) => stream,
        Err(error) => {
            tracing::error!(?error, "could not subscribe to SIGUSR1");
            process::exit(1);
        }
    };

    loop {
        stream.recv().await;

        tracing::info!("SIGUSR1 received, reloading zones");
        let start = Instant::now();
        match load_zone_configuration(&zones_dir, rop.as_ref()).await {
            Some(zones) => {
                let count = zones.len();
                registry.publish_all(zones);
                ZONES_LOADED.set(count.try_into().unwrap_or(i64::MAX));
                ZONE_RELOADS_TOTAL.inc();
                tracing::info!(
                    duration_seconds = %start.elapsed().as_secs_f64(),
                    zones = %count,
                    "reload done"
                );
            }
            None => {
                ZONE_RELOAD_FAILURES_TOTAL.inc();
                tracing::warn!(
                    duration_seconds = %start.elapsed().as_secs_f64(),
                    "reload failed, keeping the current zones"
                );
            }
        }
    }
}

fn begin_logging() {
    let log_format = if let Ok(var) = env::var("RUST_LOG_FORMAT") {
        var.split(',').map(str::to_string).collect()
    } else {
        HashSet::new()
    };

    let logger = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(!log_format.contains("no-ansi"));

    if log_format.contains("json") {
        if log_format.contains("no-time") {
            logger.json().without_time().init();
        } else {
            logger.json().init();
        }
    } else if log_format.contains("pretty") {
        if log_format.contains("no-time") {
            logger.pretty().without_time().init();
        } else {
            logger.pretty().init();
        }
    } else if log_format.contains("compact") {
        if log_format.contains("no-time") {
            logger.compact().without_time().init();
        } else {
            logger.compact().init();
        }
    } else if log_format.contains("no-time") {
        logger.without_time().init();
    } else {
        logger.init();
    }
}

// the doc comments for this struct turn into the CLI help text
#[derive(Debug, Clone, Parser)]
/// An authoritative DNS server which answers by geography.
///
/// zoned serves JSON zone files from the zones directory, picking the
/// answer record set per query from the client's country, continent,
/// region, region group, or AS number, with weighted selection and
/// server-side aliases on top.  Zones reload on SIGUSR1 without
/// interrupting queries in flight.
///
/// Prometheus metrics are served at
/// "http://{metrics_interface}:{metrics_port}/metrics"
struct Args {
    /// Interface to listen on
    #[clap(short, long, value_parser, default_value_t = Ipv4Addr::UNSPECIFIED)]
    interface: Ipv4Addr,

    /// Port to listen on
    #[clap(short, long, value_parser, default_value_t = 53)]
    port: u16,

    /// Interface to listen on to serve Prometheus metrics
    #[clap(long, value_parser, default_value_t = Ipv4Addr::LOCALHOST)]
    metrics_interface: Ipv4Addr,

    /// Port to listen on to serve Prometheus metrics
    #[clap(long, value_parser, default_value_t = 9353)]
    metrics_port: u16,

    /// Directory of zone files, one "<origin>.json" per zone
    #[clap(short, long, value_parser, default_value = "./dns")]
    zones_dir: PathBuf,

    /// Address ("host:port") of the route-override store; omit to
    /// disable override lookups
    #[clap(long, value_parser)]
    rop_server: Option<String>,

    /// Path to a settings file; command-line flags win over it
    #[clap(short, long, value_parser)]
    config_file: Option<String>,
}

impl Args {
    /// Fill in anything not given on the command line from the settings
    /// file.
    fn merge_settings(&mut self, settings: &Settings) {
        let defaults = Args::parse_from(["zoned"]);

        if self.interface == defaults.interface {
            if let Some(interface) = settings.interface {
                self.interface = interface;
            }
        }
        if self.port == defaults.port {
            if let Some(port) = settings.port {
                self.port = port;
            }
        }
        if self.zones_dir == defaults.zones_dir {
            if let Some(zones_dir) = &settings.zones_dir {
                self.zones_dir = PathBuf::from(zones_dir);
            }
        }
        if self.rop_server.is_none() {
            self.rop_server.clone_from(&settings.rop_server);
        }
    }
}

#[tokio::main]
async fn main() {
    let mut args = Args::parse();

    begin_logging();

    if let Some(config_file) = &args.config_file {
        match Settings::new(config_file) {
            Ok(settings) => args.merge_settings(&settings),
            Err(error) => {
                tracing::error!(?config_file, ?error, "could not read settings file");
                process::exit(1);
            }
        }
    }

    let rop: Option<Arc<dyn RopStore>> = args
        .rop_server
        .as_ref()
        .map(|address| Arc::new(TcpRopStore::new(address.clone())) as Arc<dyn RopStore>);

    let zones = match load_zone_configuration(&args.zones_dir, rop.as_ref()).await {
        Some(zones) if !zones.is_empty() => zones,
        Some(_) => {
            tracing::error!(zones_dir = ?args.zones_dir, "no zones to serve");
            process::exit(1);
        }
        None => {
            tracing::error!("could not load configuration");
            process::exit(1);
        }
    };

    let registry = Arc::new(ZoneRegistry::new());
    let count = zones.len();
    registry.publish_all(zones);
    ZONES_LOADED.set(count.try_into().unwrap_or(i64::MAX));

    tracing::info!(interface = %args.interface, port = %args.port, "binding DNS UDP socket");
    let udp = match UdpSocket::bind((args.interface, args.port)).await {
        Ok(socket) => socket,
        Err(error) => {
            tracing::error!(?error, "could not bind DNS UDP socket");
            process::exit(1);
        }
    };

    tracing::info!(interface = %args.interface, port = %args.port, "binding DNS TCP socket");
    let tcp = match TcpListener::bind((args.interface, args.port)).await {
        Ok(socket) => socket,
        Err(error) => {
            tracing::error!(?error, "could not bind DNS TCP socket");
            process::exit(1);
        }
    };

    // the database-backed geo adapters plug in here
    let listen_args = ListenArgs {
        registry: registry.clone(),
        geo: Arc::new(NoGeoIp),
    };

    tokio::spawn(listen_tcp_task(listen_args.clone(), tcp));
    tokio::spawn(listen_udp_task(listen_args.clone(), udp));
    tokio::spawn(reload_task(registry, args.zones_dir.clone(), rop));

    tracing::info!(interface = %args.metrics_interface, port = %args.metrics_port, "binding HTTP TCP socket");
    if let Err(error) =
        serve_prometheus_endpoint_task(args.metrics_interface, args.metrics_port).await
    {
        tracing::error!(?error, "could not bind HTTP TCP socket");
        process::exit(1);
    }
}
