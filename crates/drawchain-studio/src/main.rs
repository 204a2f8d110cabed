//! Demo driver: composes two pipelines against the software factory and
//! simulates a few frames, logging the stage trace and final context.

use std::rc::Rc;

use anyhow::Result;
use drawchain_engine::command::software::SoftwareFactory;
use drawchain_engine::logging::{init_logging, LoggingConfig};
use drawchain_engine::{compose_merging, CommandFactory, ConfigMap, ConfigValue, Fragment};
use log::{debug, info};

fn main() -> Result<()> {
    init_logging(LoggingConfig {
        env_filter: Some("drawchain_studio=info,drawchain_engine=debug".to_owned()),
    });

    println!();
    println!("  drawchain studio — software factory, no GPU attached");
    println!();

    triangle()?;
    nested_scene()?;
    Ok(())
}

/// The classic single-triangle pipeline: five declarative fragments, one
/// compiled stage, a color uniform that changes per frame.
fn triangle() -> Result<()> {
    let factory = SoftwareFactory::new();

    let frag = ConfigMap::new().frag(
        "precision mediump float;
         uniform vec4 color;
         void main() { gl_FragColor = color; }",
    );
    let vert = ConfigMap::new().vert(
        "precision mediump float;
         attribute vec2 position;
         void main() { gl_Position = vec4(position, 0, 1); }",
    );
    let position = ConfigMap::new().attribute(
        "position",
        vec![
            ConfigValue::List(vec![(-2.0).into(), (-2.0).into()]),
            ConfigValue::List(vec![4.0.into(), (-2.0).into()]),
            ConfigValue::List(vec![4.0.into(), 4.0.into()]),
        ],
    );
    let color = ConfigMap::new().uniform(
        "color",
        ConfigValue::dynamic(|_ctx, args| {
            args.get("color").cloned().unwrap_or(ConfigValue::Int(0))
        }),
    );
    let count = ConfigMap::new().count(3);

    let draw = compose_merging(
        Rc::clone(&factory) as Rc<dyn CommandFactory>,
        vec![
            Fragment::Config(frag),
            Fragment::Config(vert),
            Fragment::Config(position),
            Fragment::Config(color),
            Fragment::Config(count),
        ],
    )?;

    info!("triangle: 5 fragments -> {} stage(s)", draw.stage_count()?);

    for frame in 0..3 {
        let tint = ConfigValue::List(vec![
            ((frame as f64) * 0.25).into(),
            0.5.into(),
            0.8.into(),
            1.0.into(),
        ]);
        let context = draw
            .call(ConfigMap::new().with("color", tint))?
            .expect("software stages complete synchronously");
        info!(
            "triangle frame {frame}: uniforms = {:?}",
            context.group("uniforms").unwrap()
        );
    }

    for event in factory.trace() {
        debug!("triangle trace: {event}");
    }
    Ok(())
}

/// A mesh pipeline where the camera block is its own composite, nested as a
/// fragment of the outer composition and spliced in at composition time.
///
/// The viewport is a pre-existing opaque command; the projection uniform
/// reads the values it sets through the running context, exercising the
/// bridge between opaque and compiled stages.
fn nested_scene() -> Result<()> {
    let factory = SoftwareFactory::new();

    let viewport = factory
        .build(
            ConfigMap::new()
                .context_value("viewportWidth", 640)
                .context_value("viewportHeight", 480),
        )
        .map_err(anyhow::Error::from_boxed)?;

    let camera = compose_merging(
        Rc::clone(&factory) as Rc<dyn CommandFactory>,
        vec![
            Fragment::Config(ConfigMap::new().uniform(
                "projection",
                ConfigValue::dynamic(|ctx, _args| {
                    let viewport = ctx.group("context");
                    let side = |key| {
                        viewport
                            .and_then(|v| v.get(key))
                            .and_then(ConfigValue::as_int)
                            .unwrap_or(1)
                    };
                    ConfigValue::Float(side("viewportWidth") as f64 / side("viewportHeight") as f64)
                }),
            )),
            Fragment::Config(ConfigMap::new().uniform("view", "lookAt(eye, origin, up)")),
        ],
    )?;

    let scene = compose_merging(
        Rc::clone(&factory) as Rc<dyn CommandFactory>,
        vec![
            Fragment::Callable(viewport),
            Fragment::from(camera),
            Fragment::Config(ConfigMap::new().uniform("model", "scale(0.5)")),
            Fragment::Config(ConfigMap::new().uniform(
                "color",
                vec![
                    ConfigValue::Float(0.1),
                    ConfigValue::Float(0.2),
                    ConfigValue::Float(0.3),
                ],
            )),
            Fragment::Config(ConfigMap::new().count(3 * 1_438)),
        ],
    )?;

    info!(
        "scene: {} fragments after splicing -> {} stage(s)",
        scene.fragments().len(),
        scene.stage_count()?
    );

    let context = scene
        .call(ConfigMap::new())?
        .expect("software stages complete synchronously");
    info!("scene final context: {context:?}");
    Ok(())
}
