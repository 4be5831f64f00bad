use crate::{api::attendance, config::Config, recorder::Recorder, store::AttendanceStore};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::web;
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, store: Arc<dyn AttendanceStore>) {
    // Per-peer-IP limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let requests_per_min = requests_per_min.max(1);
        let per_ms = (60_000 / requests_per_min as u64).max(1);
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .expect("period and burst size are non-zero");
        Governor::new(&cfg)
    }

    let recorder = Recorder::new(store.clone(), config.recorder_policy());

    cfg.app_data(web::Data::new(config.clone()))
        .app_data(web::Data::new(recorder))
        .app_data(web::Data::from(store));

    cfg.service(
        web::resource("/upload")
            .wrap(build_limiter(config.rate_upload_per_min))
            .route(web::post().to(attendance::upload)),
    )
    .service(web::resource("/admin").route(web::get().to(attendance::admin)))
    .service(web::resource("/image/{id}").route(web::get().to(attendance::image)));
}
