#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use std::{error::Error, fs, path::PathBuf};

    use arboard::Clipboard;
    use clap::Parser;
    use common_types::Position;
    use log::{debug, info};
    use mapmystore::{ManualScheduler, Navigator, StoreSnapshot, WalkEvent, WalkState};
    use pathfinding::polyline_to_svg_points;
    use simplelog::{Config, LevelFilter, SimpleLogger};

    #[derive(Parser)]
    #[command(name = "mapmystore")]
    #[command(about = "Route to a product in a MapMyStore snapshot and simulate the guided walk")]
    struct Cli {
        /// Product id or name to navigate to
        product: String,

        /// Store snapshot JSON; read from the clipboard when omitted
        #[arg(long, short)]
        snapshot: Option<PathBuf>,

        /// Floor-plan SVG (road/shelf/zone rects) that replaces the snapshot layout
        #[arg(long)]
        plan_svg: Option<PathBuf>,

        /// Shopper position as "x,y" in plan coordinates
        #[arg(long, default_value = "0,0", value_parser = parse_position)]
        from: Position,

        /// Write the store map with the route as SVG
        #[arg(long)]
        svg: Option<PathBuf>,

        /// Write a rasterized map with the route overlay as PNG
        #[arg(long)]
        overlay: Option<PathBuf>,

        #[arg(long, short)]
        verbose: bool,
    }

    fn parse_position(raw: &str) -> Result<Position, String> {
        let (x, y) = raw
            .split_once(',')
            .ok_or_else(|| format!("expected x,y but got '{raw}'"))?;
        let x = x.trim().parse::<f64>().map_err(|e| format!("invalid x '{x}': {e}"))?;
        let y = y.trim().parse::<f64>().map_err(|e| format!("invalid y '{y}': {e}"))?;
        Ok(Position::new(x, y))
    }

    fn read_from_clipboard() -> Result<String, Box<dyn Error>> {
        let mut clipboard = Clipboard::new()?;
        Ok(clipboard.get_text()?)
    }

    pub fn run() -> Result<(), Box<dyn Error>> {
        let cli = Cli::parse();
        let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
        SimpleLogger::init(level, Config::default())?;

        //READ SNAPSHOT ======================================================
        let data = match &cli.snapshot {
            Some(path) => {
                info!("Reading snapshot from {}", path.display());
                fs::read_to_string(path)?
            }
            None => {
                info!("Reading snapshot from clipboard");
                read_from_clipboard()?
            }
        };
        debug!("Snapshot was {} bytes", data.len());

        let mut snapshot = match StoreSnapshot::from_json(&data) {
            Ok(s) => s,
            Err(e) => {
                println!("{}", e.user_message());
                debug!("{e}");
                return Ok(());
            }
        };
        snapshot.settings = snapshot.settings.with_env_overrides();

        if let Some(path) = &cli.plan_svg {
            let markup = fs::read_to_string(path)?;
            match snapshot.load_layout_svg(&markup) {
                Ok(plan) => info!(
                    "Loaded layout from {}: {} roads, {} shelves, {} zones",
                    path.display(),
                    plan.roads.len(),
                    plan.shelves.len(),
                    plan.zones.len()
                ),
                Err(e) => {
                    println!("{}", e.user_message());
                    info!("{e}");
                    return Ok(());
                }
            }
        }

        //ROUTE ==============================================================
        let mut nav = Navigator::new(snapshot, ManualScheduler::new());
        let plan = match nav.select_product(&cli.product, cli.from) {
            Ok(plan) => plan,
            Err(e) => {
                println!("{}", e.user_message());
                info!("{e}");
                return Ok(());
            }
        };

        println!("Product: {} ({})", plan.product.name, plan.product.id);
        println!("Shelf: {} [{}]", plan.shelf.label, plan.shelf.id);
        println!("Path: {}", polyline_to_svg_points(&plan.path));
        println!("Hops: {}  Length: {:.1}", plan.path.len() - 1, plan.length);
        for stop in &plan.stops {
            println!("Stop @{}: {} ({:?})", stop.index, stop.name, stop.kind);
        }

        if let Some(path) = &cli.svg {
            fs::write(path, nav.route_svg())?;
            info!("Saved map: {}", path.display());
        }
        if let Some(path) = &cli.overlay {
            match nav.route_png() {
                Ok(png) => {
                    fs::write(path, png)?;
                    info!("Saved overlay: {}", path.display());
                }
                Err(e) => println!("{}", e.user_message()),
            }
        }

        //WALK ===============================================================
        simulate_walk(&mut nav)?;
        Ok(())
    }

    /// Fire timers back to back and confirm every stop.
    fn simulate_walk(nav: &mut Navigator<ManualScheduler>) -> Result<(), Box<dyn Error>> {
        let mut events = nav.start_walk()?;
        let mut steps = 0usize;
        loop {
            for event in &events {
                match event {
                    WalkEvent::Stepped { path_index, position } => {
                        steps += 1;
                        debug!("step {path_index}: ({}, {})", position.x, position.y);
                    }
                    WalkEvent::StopReached { .. } => {
                        if let Some(prompt) = event.prompt() {
                            println!("{prompt}");
                        }
                    }
                    WalkEvent::Resumed { stop_index } => debug!("resumed toward stop {stop_index}"),
                    WalkEvent::Completed => println!("Walk complete after {steps} steps."),
                }
            }

            events = match nav.state() {
                WalkState::Completed => return Ok(()),
                WalkState::AwaitingConfirmation { .. } => nav.confirm(),
                WalkState::Walking { .. } | WalkState::Idle => match nav.scheduler_mut().pop() {
                    Some(tick) => nav.on_tick(tick),
                    None => return Ok(()),
                },
            };
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    cli::run()
}

#[cfg(target_arch = "wasm32")]
fn main() {}
