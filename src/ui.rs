use crate::app::{zoom_controls_col, App};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
    Frame,
};
use tui_globe::braille::BrailleCanvas;
use tui_globe::map::{MapLayers, Palette, Projection};

/// Render the UI
pub fn render<P: Projection>(frame: &mut Frame, app: &App<P>) {
    let area = frame.area();

    // Split into map area and status bar
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Map
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_map(frame, app, chunks[0]);
    render_status_bar(frame, app, chunks[1]);
}

fn render_map<P: Projection>(frame: &mut Frame, app: &App<P>, area: Rect) {
    let title = match app.view.projection().name() {
        "usa" => " United States ",
        _ => " World ",
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            title,
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Braille pixels to character cells
    let to_cell = |x: f64, y: f64| {
        let (cx, cy) = ((x / 2.0).floor(), (y / 4.0).floor());
        (cx >= 0.0 && cy >= 0.0 && cx < f64::from(inner.width) && cy < f64::from(inner.height))
            .then(|| (cx as u16, cy as u16))
    };

    let marker = app.view.scene().marker().and_then(|m| {
        let (cx, cy) = to_cell(m.position.x, m.position.y)?;
        Some((cx, cy, m.icon.glyph))
    });
    let cursor_pos = app.mouse_pixel_pos().and_then(|p| to_cell(p.x, p.y));
    let settings = app.view.settings();

    let map_widget = MapWidget {
        layers: &app.layers,
        palette: settings.palette,
        marker,
        cursor_pos,
        zoom_controls: settings
            .show_zoom_controls
            .then(|| zoom_controls_col(app.inner_cols()))
            .flatten(),
    };
    frame.render_widget(map_widget, inner);
}

/// Braille layers with the marker glyph, zoom controls and cursor on top
struct MapWidget<'a> {
    layers: &'a MapLayers,
    palette: Palette,
    marker: Option<(u16, u16, char)>,
    cursor_pos: Option<(u16, u16)>,
    /// Column of the zoom controls, when shown
    zoom_controls: Option<u16>,
}

impl MapWidget<'_> {
    /// Render a braille canvas layer with a specific color
    fn render_layer(&self, canvas: &BrailleCanvas, color: Color, area: Rect, buf: &mut Buffer) {
        let rows = canvas.height().min(area.height as usize);
        let cols = canvas.width().min(area.width as usize);
        for row in 0..rows {
            let y = area.y + row as u16;
            for col in 0..cols {
                // Blank cells leave lower layers visible
                if let Some(ch) = canvas.cell(col, row) {
                    buf[(area.x + col as u16, y)].set_char(ch).set_fg(color);
                }
            }
        }
    }

    fn put(&self, text: &str, col: u16, row: u16, style: Style, area: Rect, buf: &mut Buffer) {
        for (i, ch) in text.chars().enumerate() {
            let x = area.x + col + i as u16;
            let y = area.y + row;
            if x < area.x + area.width && y < area.y + area.height {
                buf[(x, y)].set_char(ch).set_style(style);
            }
        }
    }
}

impl Widget for MapWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Back to front
        self.render_layer(&self.layers.land, self.palette.default_fill, area, buf);
        self.render_layer(&self.layers.highlight, self.palette.selected_fill, area, buf);
        self.render_layer(&self.layers.borders, self.palette.border, area, buf);
        self.render_layer(&self.layers.markers, self.palette.marker, area, buf);

        if let Some((cx, cy, glyph)) = self.marker {
            let style = Style::default()
                .fg(self.palette.marker)
                .add_modifier(Modifier::BOLD);
            self.put(&glyph.to_string(), cx, cy, style, area, buf);
        }

        if let Some(col) = self.zoom_controls {
            let style = Style::default().fg(Color::White).bg(Color::DarkGray);
            self.put("[+]", col, 0, style, area, buf);
            self.put("[-]", col, 1, style, area, buf);
        }

        if let Some((cx, cy)) = self.cursor_pos {
            self.put("╋", cx, cy, Style::default().fg(Color::Red), area, buf);
        }
    }
}

fn toggle(on: bool, on_label: &'static str, off_label: &'static str) -> Span<'static> {
    Span::styled(
        if on { on_label } else { off_label },
        Style::default().fg(if on { Color::Green } else { Color::DarkGray }),
    )
}

fn render_status_bar<P: Projection>(frame: &mut Frame, app: &App<P>, area: Rect) {
    let settings = app.view.settings();
    let selected = app.view.selected_name().unwrap_or("-");
    let hovered = app.hovered().unwrap_or("");

    let status = Line::from(vec![
        Span::styled(" Zoom: ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.zoom_level(), Style::default().fg(Color::Yellow)),
        Span::styled(" Selected: ", Style::default().fg(Color::DarkGray)),
        Span::styled(selected.to_string(), Style::default().fg(settings.palette.selected_fill)),
        Span::raw(" "),
        toggle(settings.show_borders, "[B]order ", "[b]order "),
        toggle(settings.show_markers, "[M]arkers ", "[m]arkers "),
        toggle(app.view.is_auto_rotating(), "[A]uto ", "[a]uto "),
        Span::styled("| ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.center_coords(), Style::default().fg(Color::Cyan)),
        Span::styled(format!(" {hovered}"), Style::default().fg(Color::White)),
        Span::styled(
            " | hjkl:rotate +/-:zoom n/p:select x:clear r:reset q:quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let paragraph = Paragraph::new(status);
    frame.render_widget(paragraph, area);
}
