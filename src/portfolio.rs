use crate::position::Position;
use piechart::{Chart, Color};

/// A named, ordered collection of positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub name: String,
    pub positions: Vec<Position>,
}

/// A position together with its derived columns.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRow<'a> {
    pub position: &'a Position,
    pub value: f64,
    pub gain_loss: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Valuation<'a> {
    pub rows: Vec<PositionRow<'a>>,
    pub total_value: f64,
}

const PROMPT_HEADERS: [&str; 6] = ["Symbol", "Quantity", "Cost", "Current", "Value", "Gain/Loss"];

impl Portfolio {
    pub fn new(name: &str) -> Portfolio {
        Portfolio {
            name: name.to_string(),
            positions: Vec::new(),
        }
    }

    pub fn with_positions(name: &str, positions: Vec<Position>) -> Portfolio {
        Portfolio {
            name: name.to_string(),
            positions,
        }
    }

    pub fn add_position(&mut self, position: Position) {
        self.positions.push(position);
    }

    /// Derive value and gain/loss for every position. Always computed fresh
    /// from the positions so the columns cannot go stale.
    pub fn valuation(&self) -> Valuation<'_> {
        let rows: Vec<PositionRow> = self
            .positions
            .iter()
            .map(|position| PositionRow {
                position,
                value: position.value(),
                gain_loss: position.gain_loss(),
            })
            .collect();
        let total_value = rows.iter().map(|r| r.value).sum();

        Valuation { rows, total_value }
    }

    pub fn get_total_value(&self) -> f64 {
        self.positions.iter().map(Position::value).sum()
    }

    pub fn get_total_gain_loss(&self) -> f64 {
        self.positions.iter().map(Position::gain_loss).sum()
    }

    /// Share of total value per symbol in percent, largest first
    pub fn get_allocation(&self) -> Vec<(String, f64)> {
        let total_value = self.get_total_value();
        let mut allocation: Vec<(String, f64)> = self
            .positions
            .iter()
            .map(|p| {
                let share = if total_value > 0.0 {
                    p.value() / total_value * 100.0
                } else {
                    0.0
                };
                (p.get_symbol().to_string(), share)
            })
            .collect();
        allocation.sort_by(|a, b| b.1.total_cmp(&a.1));
        allocation
    }

    /// Plain-text table of all positions and derived columns, right-aligned
    /// and without a row index.
    pub fn to_prompt_text(&self) -> String {
        let valuation = self.valuation();
        let body: Vec<[String; 6]> = valuation
            .rows
            .iter()
            .map(|row| {
                [
                    row.position.get_symbol().to_string(),
                    format_amount(row.position.get_quantity()),
                    format!("{:.2}", row.position.get_cost()),
                    format!("{:.2}", row.position.get_current()),
                    format!("{:.2}", row.value),
                    format!("{:.2}", row.gain_loss),
                ]
            })
            .collect();

        let mut widths = PROMPT_HEADERS.map(str::len);
        for cells in &body {
            for (width, cell) in widths.iter_mut().zip(cells.iter()) {
                *width = (*width).max(cell.len());
            }
        }

        let format_line = |cells: &[&str]| {
            cells
                .iter()
                .zip(widths.iter())
                .map(|(cell, &width)| format!("{cell:>width$}"))
                .collect::<Vec<_>>()
                .join(" ")
        };

        let mut lines = vec![format_line(&PROMPT_HEADERS)];
        for cells in &body {
            let refs: Vec<&str> = cells.iter().map(String::as_str).collect();
            lines.push(format_line(&refs));
        }
        lines.join("\n")
    }

    // Print the portfolio as a table
    pub fn print(&self, include_sum: bool) {
        use comfy_table::{
            presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor,
            ContentArrangement, Table,
        };

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_width(100);

        table.set_header(
            PROMPT_HEADERS
                .iter()
                .map(|h| Cell::new(*h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );

        let pnl_cell = |v: f64| {
            let c = if v >= 0.0 { TColor::Green } else { TColor::Red };
            Cell::new(format!("{v:.2}"))
                .set_alignment(CellAlignment::Right)
                .fg(c)
        };

        let valuation = self.valuation();
        for row in &valuation.rows {
            let position = row.position;
            table.add_row(vec![
                Cell::new(position.get_symbol()),
                Cell::new(format_amount(position.get_quantity()))
                    .set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", position.get_cost()))
                    .set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", position.get_current()))
                    .set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", row.value)).set_alignment(CellAlignment::Right),
                pnl_cell(row.gain_loss),
            ]);
        }

        if include_sum {
            table.add_row(vec![
                Cell::new("TOTAL").add_attribute(Attribute::Bold),
                Cell::new(""),
                Cell::new(""),
                Cell::new(""),
                Cell::new(format_dollars(valuation.total_value))
                    .set_alignment(CellAlignment::Right)
                    .add_attribute(Attribute::Bold),
                pnl_cell(self.get_total_gain_loss()).add_attribute(Attribute::Bold),
            ]);
        }

        println!("Portfolio: {}", self.name);
        println!("{table}");
    }

    // Print the allocation in descending order %-wise
    pub fn print_allocation(&self) {
        println!("====================================");
        for (symbol, percentage) in self.get_allocation() {
            println!("{symbol: >12} | {percentage: >10.2}");
        }
    }

    pub fn draw_pie_chart(&self) {
        let colors = [
            Color::Red,
            Color::Green,
            Color::Blue,
            Color::Yellow,
            Color::Cyan,
            Color::White,
            Color::Purple,
            Color::Black,
        ];

        let data: Vec<piechart::Data> = self
            .positions
            .iter()
            .enumerate()
            .map(|(i, position)| piechart::Data {
                label: position.get_symbol().to_string(),
                value: position.value() as f32,
                color: Some(colors[i % colors.len()].into()),
                fill: '•',
            })
            .collect();

        Chart::new()
            .legend(true)
            .radius(9)
            .aspect_ratio(3)
            .draw(&data);
    }
}

/// Format a money amount as `$1,234.56` (`-$1,234.56` for negatives).
pub fn format_dollars(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}${}", format_with_commas(value.abs()))
}

fn format_with_commas(value: f64) -> String {
    let formatted = format!("{value:.2}");
    let (integer_part, decimal_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let formatted_integer = integer_part
        .chars()
        .rev()
        .collect::<Vec<_>>()
        .chunks(3)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(",")
        .chars()
        .rev()
        .collect::<String>();

    format!("{formatted_integer}.{decimal_part}")
}

pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{amount:.0}")
    } else {
        // up to 8 decimals, trailing zeros trimmed
        let s = format!("{amount:.8}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
