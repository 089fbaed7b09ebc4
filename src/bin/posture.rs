use caretaker::{app, body::PostureAnalyzer};

fn main() -> anyhow::Result<()> {
    caretaker::init_logger!();

    let analyzer = PostureAnalyzer::load()?;
    app::run(analyzer)
}
