use actix_web::{get, http::header::ContentType, App, HttpResponse, HttpServer, Responder};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::net::Ipv4Addr;

lazy_static! {
    pub static ref DNS_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "zoned_requests_total",
        "Requests received, by protocol.",
        &["protocol"]
    )
    .unwrap();
    pub static ref DNS_RESPONSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "zoned_responses_total",
        "Responses sent, by rcode.",
        &["rcode"]
    )
    .unwrap();
    pub static ref DNS_RESPONSE_TIME_SECONDS: HistogramVec = register_histogram_vec!(
        "zoned_response_time_seconds",
        "Time to serve a request, by protocol.",
        &["protocol"]
    )
    .unwrap();
    pub static ref DNS_QUESTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "zoned_questions_total",
        "Questions asked, by qtype.",
        &["qtype"]
    )
    .unwrap();
    pub static ref DNS_EDNS_QUERIES_TOTAL: IntCounter = register_int_counter!(
        "zoned_edns_queries_total",
        "Queries carrying an EDNS OPT record."
    )
    .unwrap();
    pub static ref ZONE_QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "zoned_zone_queries_total",
        "Questions answered, by zone origin.",
        &["zone"]
    )
    .unwrap();
    pub static ref RESOLVER_EXACT_HITS_TOTAL: IntCounter = register_int_counter!(
        "zoned_resolver_exact_hits_total",
        "Lookups satisfied from the exact-label table."
    )
    .unwrap();
    pub static ref RESOLVER_WILDCARD_HITS_TOTAL: IntCounter = register_int_counter!(
        "zoned_resolver_wildcard_hits_total",
        "Lookups satisfied through a wildcard label."
    )
    .unwrap();
    pub static ref RESOLVER_ALIAS_FOLLOWS_TOTAL: IntCounter = register_int_counter!(
        "zoned_resolver_alias_follows_total",
        "Aliases chased during lookups."
    )
    .unwrap();
    pub static ref RESOLVER_ROP_LOOKUPS_TOTAL: IntCounter = register_int_counter!(
        "zoned_resolver_rop_lookups_total",
        "Route-override store consultations."
    )
    .unwrap();
    pub static ref RESOLVER_ROP_OVERRIDES_TOTAL: IntCounter = register_int_counter!(
        "zoned_resolver_rop_overrides_total",
        "Consultations which diverted to the fallback label."
    )
    .unwrap();
    pub static ref RESOLVER_EMPTY_ANSWERS_TOTAL: IntCounter = register_int_counter!(
        "zoned_resolver_empty_answers_total",
        "Lookups answered NOERROR with no records."
    )
    .unwrap();
    pub static ref RESOLVER_NAME_ERRORS_TOTAL: IntCounter = register_int_counter!(
        "zoned_resolver_name_errors_total",
        "Lookups answered NXDOMAIN."
    )
    .unwrap();
    pub static ref ZONE_RELOADS_TOTAL: IntCounter =
        register_int_counter!("zoned_reloads_total", "Successful zone reloads.").unwrap();
    pub static ref ZONE_RELOAD_FAILURES_TOTAL: IntCounter =
        register_int_counter!("zoned_reload_failures_total", "Failed zone reloads.").unwrap();
    pub static ref ZONES_LOADED: IntGauge =
        register_int_gauge!("zoned_zones_loaded", "Zones currently published.").unwrap();
}

/// Fold one query's resolver metrics into the process counters.
pub fn observe_resolution(metrics: &zoned_resolver::metrics::Metrics) {
    RESOLVER_EXACT_HITS_TOTAL.inc_by(metrics.exact_hits);
    RESOLVER_WILDCARD_HITS_TOTAL.inc_by(metrics.wildcard_hits);
    RESOLVER_ALIAS_FOLLOWS_TOTAL.inc_by(metrics.alias_follows);
    RESOLVER_ROP_LOOKUPS_TOTAL.inc_by(metrics.rop_lookups);
    RESOLVER_ROP_OVERRIDES_TOTAL.inc_by(metrics.rop_overrides);
    RESOLVER_EMPTY_ANSWERS_TOTAL.inc_by(metrics.empty_answers);
    RESOLVER_NAME_ERRORS_TOTAL.inc_by(metrics.name_errors);
}

#[get("/metrics")]
async fn get_metrics() -> impl Responder {
    match TextEncoder::new().encode_to_string(&prometheus::gather()) {
        Ok(metrics_str) => HttpResponse::Ok()
            .content_type(ContentType::plaintext())
            .body(metrics_str),
        Err(error) => {
            tracing::warn!(?error, "could not serialise metrics");
            HttpResponse::InternalServerError()
                .content_type(ContentType::plaintext())
                .body(error.to_string())
        }
    }
}

pub async fn serve_prometheus_endpoint_task(address: Ipv4Addr, port: u16) -> std::io::Result<()> {
    HttpServer::new(|| App::new().service(get_metrics))
        .bind((address, port))?
        .run()
        .await
}
