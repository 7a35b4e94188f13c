//! medinfo TUI: chat with the medicine assistant and browse the dataset,
//! built with `ratatui` + `crossterm`.

mod app;
mod screens;
mod widgets;

use color_eyre::eyre::Result;

fn main() -> Result<()> {
    color_eyre::install()?;
    app::run()
}
