use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Responder, guard, http::Method, web};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::gpio::{Direction, GpioBackend, GpioManager};
use crate::metrics::PrometheusMetrics;

pub struct AppState<B: GpioBackend> {
    pub manager: Arc<GpioManager<B>>,
    pub metrics: Arc<PrometheusMetrics>,
}

impl<B: GpioBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

#[derive(Deserialize)]
struct ConfigurePayload {
    direction: String,
}

impl<B: GpioBackend + 'static> AppState<B> {
    pub fn api_scope(&self, base_path: &str) -> actix_web::Scope {
        web::scope(base_path)
            .service(
                web::resource("/health")
                    .route(web::get().to(health))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/metrics")
                    .route(web::get().to(metrics::<B>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/gpios")
                    .route(web::get().to(list_gpios::<B>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/gpio/{pin_id}/configure")
                    .route(web::post().to(configure::<B>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::POST]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/gpio/{pin_id}/value")
                    .route(web::get().to(get_value::<B>))
                    .route(web::post().to(set_value::<B>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET, Method::POST]))
                            .to(method_not_allowed),
                    ),
            )
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

async fn metrics<B: GpioBackend + 'static>(
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let text = state
        .metrics
        .render()
        .map_err(|e| AppError::Config(format!("Failed to render metrics: {e}")))?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(text))
}

async fn list_gpios<B: GpioBackend + 'static>(
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    Ok(web::Json(state.manager.pins()))
}

async fn configure<B: GpioBackend + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;
    let direction = parse_configure_payload(&body)?;

    let manager = Arc::clone(&state.manager);
    run_blocking(move || manager.configure(pin_id, direction)).await?;

    Ok(web::Json(json!({ "pin": pin_id, "direction": direction })))
}

async fn get_value<B: GpioBackend + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;

    let manager = Arc::clone(&state.manager);
    let value = run_blocking(move || manager.read(pin_id)).await?;

    Ok(web::Json(value))
}

async fn set_value<B: GpioBackend + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;
    let value = parse_value_payload(&body)?;

    let manager = Arc::clone(&state.manager);
    run_blocking(move || manager.write(pin_id, value)).await?;

    Ok(HttpResponse::Ok())
}

// registry calls take a blocking lock, keep them off the async workers
async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, crate::error::GpioError> + Send + 'static,
    T: Send + 'static,
{
    web::block(f)
        .await
        .map_err(|e| AppError::Config(format!("Blocking task failed: {e}")))?
        .map_err(AppError::from)
}

fn parse_configure_payload(body: &[u8]) -> Result<Direction, AppError> {
    if body.is_empty() {
        return Err(AppError::InvalidValue("Empty configure payload".into()));
    }

    let payload: ConfigurePayload = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidValue(format!("Invalid configure payload: {e}")))?;

    Ok(payload.direction.parse::<Direction>()?)
}

fn parse_value_payload(body: &[u8]) -> Result<bool, AppError> {
    if body.is_empty() {
        return Err(AppError::InvalidValue("Empty value payload".into()));
    }

    match std::str::from_utf8(body) {
        Ok(text) => match text.trim() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(AppError::InvalidValue(
                "Value must be true, false, 1 or 0".into(),
            )),
        },
        _ => Err(AppError::InvalidValue(
            "Value payload must be valid UTF-8".into(),
        )),
    }
}

fn parse_pin_id(req: &HttpRequest) -> Result<u32, AppError> {
    let pin_id = req
        .match_info()
        .get("pin_id")
        .ok_or_else(|| AppError::InvalidValue("Missing pin id".into()))?;
    let pin_id = pin_id
        .parse::<u32>()
        .map_err(|_| AppError::InvalidValue("Invalid pin id".into()))?;

    Ok(pin_id)
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().finish()
}

fn guard_not_methods(methods: &[Method]) -> impl guard::Guard {
    let allowed: Vec<Method> = methods.to_vec();
    guard::fn_guard(move |ctx| !allowed.iter().any(|m| m == ctx.head().method))
}
