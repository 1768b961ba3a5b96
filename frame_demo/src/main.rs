//! Headless frame demo
//!
//! Starts the rendering thread on the null backend, lets several producer
//! threads populate scenes through the command queue, renders a few frames per
//! scene and logs the statistics.
//!
//! Usage: `frame_demo [config.toml|config.ron]`

use std::sync::Arc;

use rand::Rng;
use render_core::foundation::logging;
use render_core::foundation::math::Point3;
use render_core::prelude::*;
use render_core::render::rhi::{ShaderFrequency, ShaderRhi};

const PRODUCERS: u64 = 3;
const PRIMITIVES_PER_SCENE: usize = 64;
const FRAMES: usize = 4;

#[derive(thiserror::Error, Debug)]
enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("producer thread {0} panicked")]
    ProducerPanicked(u64),
}

fn load_config() -> Result<RenderCoreConfig, DemoError> {
    match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            let config = RenderCoreConfig::load_from_file(&path)?;
            config.validate()?;
            Ok(config)
        }
        None => Ok(RenderCoreConfig::default()),
    }
}

fn material(name: &str, shader_base: u64) -> MaterialRef {
    let mut material = BasicMaterial::new(name);
    let kinds = [DrawingPolicyKind::Base, DrawingPolicyKind::DepthOnly, DrawingPolicyKind::HitProxy];
    for (offset, kind) in (0_u64..).step_by(2).zip(kinds) {
        material = material
            .with_shader(
                kind,
                BasicShader::shared(format!("{name}.{kind:?}.vs"), ShaderFrequency::Vertex, ShaderRhi(shader_base + offset)),
            )
            .with_shader(
                kind,
                BasicShader::shared(format!("{name}.{kind:?}.ps"), ShaderFrequency::Pixel, ShaderRhi(shader_base + offset + 1)),
            );
    }
    Arc::new(material)
}

fn camera() -> SceneView {
    let view = Mat4::look_at_rh(&Point3::new(0.0, 4.0, 14.0), &Point3::origin(), &Vec3::y());
    let projection = Mat4::new_perspective(16.0 / 9.0, std::f32::consts::FRAC_PI_3, 0.1, 200.0);
    SceneView::new(view, projection, (1280, 720))
        .with_background_color([0.05, 0.05, 0.1, 1.0])
        .with_show_flags(ShowFlags::default() | ShowFlags::DEPTH_PREPASS)
}

/// Builds one scene from a producer thread and renders it
fn produce(producer: u64, mut queue: RenderCommandQueue) -> Result<(), RenderError> {
    let mut rng = rand::thread_rng();
    let shader_base = 1000 * (producer + 1);

    let rock = material(&format!("Rock{producer}"), shader_base);
    let gold = material(&format!("Gold{producer}"), shader_base + 100);
    let glow = material(&format!("Glow{producer}"), shader_base + 200);

    let cube = Arc::new(StaticMesh::cube(format!("Cube{producer}"), rock));
    let quad = Arc::new(StaticMesh::sprite_quad(format!("Quad{producer}"), glow));
    cube.init_resources(&mut queue);
    quad.init_resources(&mut queue);

    let gizmo = Arc::new(DynamicMeshBuilder::new(format!("Gizmo{producer}")));
    gizmo.add_box(Vec3::new(-0.1, -0.1, -0.1), Vec3::new(0.1, 0.1, 0.1), [1.0, 0.8, 0.0, 1.0]);
    gizmo.build(&mut queue);

    let mut primitives: Vec<PrimitiveRef> = Vec::with_capacity(PRIMITIVES_PER_SCENE + 4);
    for i in 0..PRIMITIVES_PER_SCENE {
        let position = Vec3::new(rng.gen_range(-12.0..12.0), rng.gen_range(-3.0..3.0), rng.gen_range(-20.0..4.0));
        let mut primitive = StaticMeshPrimitive::new(format!("Cube{producer}.{i}"), cube.clone())
            .with_transform(Transform::from_position(position).with_uniform_scale(rng.gen_range(0.5..1.5)).to_matrix())
            .with_hit_proxy(HitProxyId(u32::try_from(i).unwrap_or(u32::MAX)));
        if i % 4 == 0 {
            primitive = primitive.with_override_material(0, gold.clone());
        }
        primitives.push(primitive_ref(primitive));
    }
    for (i, x) in [-4.5_f32, -1.5, 1.5, 4.5].into_iter().enumerate() {
        let position = Vec3::new(x, 5.0, -2.0);
        primitives.push(primitive_ref(SpritePrimitive::new(format!("Light{producer}.{i}"), quad.clone(), position, 0.75)));
    }

    let scene = SceneId::next();
    queue.enqueue("CreateScene", move |context| {
        context.create_scene(scene);
        for primitive in primitives {
            context.add_primitive(scene, primitive);
        }
    });

    let gizmo_material = material(&format!("Gizmo{producer}"), shader_base + 300);
    for frame in 0..FRAMES {
        let gizmo = Arc::clone(&gizmo);
        let gizmo_material = gizmo_material.clone();
        queue.enqueue("RenderScene", move |context| {
            let view = camera();
            let Some(stats) = context.render_scene(scene, &view) else {
                log::warn!("scene {:?} missing", scene);
                return;
            };
            let gizmo_stats = gizmo.draw(
                context.device_mut(),
                &Mat4::identity(),
                &gizmo_material,
                DrawingPolicyKind::Base,
                &view,
            );
            log::info!(
                "[producer {}] frame {}: {} primitives ({} culled), {} links, {} draw calls (+{} gizmo), {} instances",
                producer,
                frame,
                stats.build.primitives_added,
                stats.build.primitives_culled,
                stats.draw.links_drawn,
                stats.draw.draw_calls,
                gizmo_stats.draw_calls,
                stats.draw.instances
            );
        });
    }

    queue.enqueue("HitProxyPass", move |context| {
        if let Some(stats) = context.render_hit_proxies(scene, &camera()) {
            log::info!("[producer {}] hit proxy pass: {} draw calls", producer, stats.draw.draw_calls);
        }
    });

    queue.enqueue("DestroyScene", move |context| {
        context.remove_scene(scene);
    });
    queue.flush()?;

    gizmo.release(&mut queue);
    quad.release_resources(&mut queue);
    cube.release_resources(&mut queue);
    queue.flush()
}

fn main() -> Result<(), DemoError> {
    logging::init_with_level("info");
    let mut config = load_config()?;
    if !config.threaded_rendering {
        log::warn!("Producers need a rendering thread to flush against; enabling threaded rendering");
        config = config.with_threaded_rendering(true);
    }
    log::info!("Starting frame demo with {} producers", PRODUCERS);

    let rhi = NullRhi::new();
    let counters = rhi.counters();
    let rendering = RenderingThread::start(config, Box::new(rhi))?;

    let workers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = rendering.queue();
            (producer, std::thread::spawn(move || produce(producer, queue)))
        })
        .collect();

    for (producer, worker) in workers {
        worker.join().map_err(|_| DemoError::ProducerPanicked(producer))??;
    }

    let context = rendering.stop()?;
    let stats = counters.snapshot();
    log::info!(
        "Done: {} draw calls, {} instances, {} bound shader states, {} global resources left",
        stats.draw_calls,
        stats.instances_drawn,
        stats.bound_shader_states_created,
        context.global_resources().len()
    );
    Ok(())
}
