use crate::{
    catalog::ClassCatalog,
    config::Config,
    detection_service::DetectionService,
    labels::ClassNames,
    model_service::ModelService,
    lifecycle::ModelLifecycle,
    ort_service::OrtModelService,
    server::{HttpServer, SharedState},
};
use std::sync::Arc;

/// Loads the catalog and the model, then serves. The listener is only bound
/// once the model lifecycle has settled, so no request observes `Loading`.
pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let catalog = Arc::new(ClassCatalog::load(&config.catalog)?);
    tracing::info!("Loaded catalog with {} entries", catalog.len());

    let model_config = config.model.clone();
    let model_path = model_config.get_path();
    tracing::info!("Model path: {}", model_path.display());

    let lifecycle = Arc::new(ModelLifecycle::<OrtModelService>::new());
    let status = lifecycle
        .load_with(move || OrtModelService::new(&model_config, &model_path))
        .await;

    match lifecycle.model() {
        Some(model) => log_classes(model.class_names(), &catalog),
        None => tracing::warn!(
            "Model status is {:?}, detection requests will be rejected",
            status
        ),
    }

    let detection_service = DetectionService::new(lifecycle, catalog, config.image.clone());
    let server = HttpServer::new(SharedState::new(detection_service), &config.server).await?;

    server.run().await
}

fn log_classes(class_names: &ClassNames, catalog: &ClassCatalog) {
    tracing::info!("Classes ({}):", class_names.len());
    for (class_id, label) in class_names.iter() {
        tracing::info!(
            "ID: {} -> label: {} -> price: {}",
            class_id,
            label,
            catalog.price_for(label)
        );
    }
}
