use config::CorsConfig;
use http::HeaderValue;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

/// Build the CORS layer from configuration.
///
/// Methods and headers mirror the request, which stays valid when
/// credentials are allowed (a wildcard would not).
pub(super) fn generate(
    CorsConfig {
        allow_origins,
        allow_credentials,
        max_age,
    }: &CorsConfig,
) -> CorsLayer {
    let mut cors_layer = CorsLayer::new()
        .allow_credentials(*allow_credentials)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    cors_layer = match allow_origins {
        Some(origins) => {
            let origins = origins.iter().map(|origin| {
                let origin = &origin[..url::Position::BeforePath];
                HeaderValue::from_str(origin).expect("must be ascii")
            });

            cors_layer.allow_origin(AllowOrigin::list(origins))
        }
        None if *allow_credentials => cors_layer.allow_origin(AllowOrigin::mirror_request()),
        None => cors_layer.allow_origin(AllowOrigin::any()),
    };

    if let Some(max_age) = max_age {
        cors_layer = cors_layer.max_age(*max_age);
    }

    cors_layer
}
