use caretaker::{app, face::DistanceAnalyzer};

fn main() -> anyhow::Result<()> {
    caretaker::init_logger!();

    let analyzer = DistanceAnalyzer::load()?;
    app::run(analyzer)
}
