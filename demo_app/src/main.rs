//! Ember demo application
//!
//! Loads the assets listed in `resources/manifest.ron`, builds the scene
//! described by `resources/scenes/demo.ron` and renders it for the configured
//! number of frames. Runs headless on the mock device unless built with the
//! `gl` feature and configured for the `Gl` backend.

mod mesh_renderer;

use ember_engine::prelude::*;
use ember_engine::scene::{MaterialDescription, SceneResult};
use mesh_renderer::MeshRenderer;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

const CONFIG_PATH: &str = "demo_app/resources/engine.toml";
const SCENE_NAME: &str = "demo";

/// Registers the demo scene and drives it
struct DemoSystem;

impl System for DemoSystem {
    fn name(&self) -> &str {
        "demo"
    }

    fn setup(&mut self, ctx: &mut EngineContext<'_>) -> EngineResult<()> {
        ctx.components
            .register_serde::<MeshRenderer>(MeshRenderer::TYPE_NAME)
            .map_err(SceneError::from)?;

        let resource = Resource::read(ctx.assets.resolve("scenes/demo.ron")?)?;
        let document = SceneDocument::from_ron(resource.text()?).map_err(SceneError::from)?;
        log::info!("Scene '{}' has {} root objects", document.name, document.objects.len());

        let scene = GraphScene::from_document(document).with_load_hook(Box::new(attach_renderer_assets));
        ctx.scenes.register(Box::new(scene))?;
        ctx.push_scene(SCENE_NAME)?;
        Ok(())
    }

    fn teardown(&mut self, ctx: &mut EngineContext<'_>) {
        let popped = ctx.pop_scene();
        log::info!("Popped scene '{}'", popped);
    }

    fn on_event(&mut self, ctx: &mut EngineContext<'_>, event: &WindowEvent) {
        if let WindowEvent::Key {
            key: KeyCode::Escape,
            pressed: true,
        } = event
        {
            ctx.quit();
        }
    }
}

fn load_failed(reason: impl fmt::Display) -> SceneError {
    SceneError::LoadFailed {
        scene: SCENE_NAME.to_string(),
        reason: reason.to_string(),
    }
}

fn load_material(name: &str, ctx: &SceneContext<'_>) -> SceneResult<Material> {
    let path = ctx.assets.resolve(format!("materials/{}.ron", name)).map_err(load_failed)?;
    let resource = Resource::read(path).map_err(load_failed)?;
    let description = MaterialDescription::from_ron(resource.text().map_err(load_failed)?).map_err(load_failed)?;
    Material::build(&description, ctx.renderer, ctx.assets).map_err(load_failed)
}

fn attach_renderer_assets(scene: &mut GraphScene, ctx: &mut SceneContext<'_>) -> SceneResult<()> {
    let mut materials: HashMap<String, Rc<Material>> = HashMap::new();
    let graph = scene.graph_mut();
    if graph.dirty() {
        graph.update();
    }

    for id in graph.objects().to_vec() {
        let Some(renderer) = graph.component_mut::<MeshRenderer>(id) else {
            continue;
        };
        let material = match materials.get(&renderer.material) {
            Some(material) => material.clone(),
            None => {
                let material = Rc::new(load_material(&renderer.material, ctx)?);
                materials.insert(renderer.material.clone(), material.clone());
                material
            }
        };
        let mesh = ctx.assets.meshes().get(&renderer.mesh).map_err(load_failed)?;
        renderer.bind_assets(mesh, material);
    }

    log::info!("Attached {} material(s)", materials.len());
    Ok(())
}

fn default_config() -> EngineConfig {
    EngineConfig {
        assets: AssetConfig {
            search_paths: vec!["demo_app/resources".to_string(), "resources".to_string()],
            manifest: Some("manifest.ron".to_string()),
        },
        time: TimeConfig {
            max_frames: Some(120),
            ..TimeConfig::default()
        },
        ..EngineConfig::default()
    }
}

#[cfg(feature = "gl")]
fn create_engine(config: EngineConfig, app: App) -> EngineResult<Engine> {
    if config.renderer.backend == BackendKind::Gl {
        Engine::windowed(config, app)
    } else {
        Engine::headless(config, app)
    }
}

#[cfg(not(feature = "gl"))]
fn create_engine(config: EngineConfig, app: App) -> EngineResult<Engine> {
    Engine::headless(config, app)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    ember_engine::foundation::logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::load_from_file(CONFIG_PATH).unwrap_or_else(|err| {
            log::warn!("Using default config ({}): {}", CONFIG_PATH, err);
            default_config()
        }),
    };

    let mut app = App::new();
    app.register(Box::new(DemoSystem))?;
    app.on_post_teardown(Box::new(|ctx: &mut EngineContext<'_>| {
        log::info!("Demo ran for {} frames", ctx.time.frame());
        Ok(())
    }));

    let mut engine = create_engine(config, app)?;
    engine.run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource_config(frames: u64) -> EngineConfig {
        let mut config = default_config();
        config.assets.search_paths = vec![concat!(env!("CARGO_MANIFEST_DIR"), "/resources").to_string()];
        config.time.max_frames = Some(frames);
        config
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = EngineConfig::load_from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/resources/engine.toml")).unwrap();
        assert_eq!(config.renderer.backend, BackendKind::Mock);
        assert_eq!(config.assets.manifest.as_deref(), Some("manifest.ron"));
    }

    #[test]
    fn test_demo_scene_runs_headless() {
        let mut app = App::new();
        app.register(Box::new(DemoSystem)).unwrap();
        let mut engine = Engine::headless(resource_config(3), app).unwrap();
        engine.run().unwrap();
        assert_eq!(engine.time().frame(), 3);
        assert!(engine.scenes().active().is_none());
    }
}
