use super::{ComplaintDetails, ReportGenerator, ReportSummary};
use crate::db::models::{ReportEntry, Severity};
use crate::error::Error;
use log::info;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 20.0;
const MARGIN_TOP: f32 = 20.0;
const MARGIN_BOTTOM: f32 = 20.0;
/// Millimetres per point, times a comfortable leading
const LINE_HEIGHT_PER_PT: f32 = 0.3528 * 1.45;
const WRAP_COLUMNS: usize = 90;

const AUTHORITY: &str = "The Commissioner, Municipal Road Maintenance Department";

/// A4 complaint report using the PDF built-in fonts
#[derive(Debug, Clone, Default)]
pub struct PdfReportGenerator;

impl PdfReportGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl ReportGenerator for PdfReportGenerator {
    fn generate(
        &self,
        details: &ComplaintDetails,
        potholes: &[ReportEntry],
        output: &Path,
    ) -> Result<(), Error> {
        let (doc, page, layer) = PdfDocument::new(
            "Road Health Complaint Report",
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            "Layer 1",
        );
        let fonts = Fonts {
            regular: builtin(&doc, BuiltinFont::Helvetica)?,
            bold: builtin(&doc, BuiltinFont::HelveticaBold)?,
            mono: builtin(&doc, BuiltinFont::Courier)?,
        };
        let layer = doc.get_page(page).get_layer(layer);
        let mut writer = PageWriter {
            doc: &doc,
            layer,
            cursor: PAGE_HEIGHT - MARGIN_TOP,
            pages: 1,
        };

        write_header(&mut writer, &fonts, details);
        write_summary(&mut writer, &fonts, potholes);
        write_table(&mut writer, &fonts, potholes);
        write_closing(&mut writer, &fonts);

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(output)?;
        let pages = writer.pages;
        doc.save(&mut BufWriter::new(file))
            .map_err(|e| Error::Report(format!("Failed to write PDF {:?}: {}", output, e)))?;

        info!(
            "Wrote complaint report {:?} ({} potholes, {} pages)",
            output,
            potholes.len(),
            pages
        );
        Ok(())
    }
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    mono: IndirectFontRef,
}

fn builtin(doc: &PdfDocumentReference, font: BuiltinFont) -> Result<IndirectFontRef, Error> {
    doc.add_builtin_font(font)
        .map_err(|e| Error::Report(format!("Failed to load built-in font: {}", e)))
}

/// Top-to-bottom text cursor that starts a new page when it runs out of room
struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    cursor: f32,
    pages: usize,
}

impl PageWriter<'_> {
    fn line(&mut self, text: &str, size: f32, font: &IndirectFontRef) {
        let height = size * LINE_HEIGHT_PER_PT;
        if self.cursor - height < MARGIN_BOTTOM {
            self.new_page();
        }
        self.cursor -= height;
        self.layer
            .use_text(text, size, Mm(MARGIN_LEFT), Mm(self.cursor), font);
    }

    fn paragraph(&mut self, text: &str, size: f32, font: &IndirectFontRef) {
        for line in wrap(text, WRAP_COLUMNS) {
            self.line(&line, size, font);
        }
    }

    fn gap(&mut self, mm: f32) {
        self.cursor -= mm;
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.cursor = PAGE_HEIGHT - MARGIN_TOP;
        self.pages += 1;
    }
}

fn write_header(writer: &mut PageWriter<'_>, fonts: &Fonts, details: &ComplaintDetails) {
    writer.line("Road Health Complaint Report", 18.0, &fonts.bold);
    writer.line(
        &format!(
            "Generated on {}",
            details.generated_at.format("%d %B %Y, %H:%M UTC")
        ),
        10.0,
        &fonts.regular,
    );
    writer.gap(6.0);

    writer.line("To,", 11.0, &fonts.regular);
    writer.line(AUTHORITY, 11.0, &fonts.regular);
    writer.gap(4.0);
    writer.paragraph(
        &format!(
            "Subject: Complaint regarding potholes on the route from {} to {}",
            details.source, details.destination
        ),
        11.0,
        &fonts.bold,
    );
    writer.gap(4.0);
    writer.paragraph(
        &format!(
            "Respected Sir/Madam, this report lists road surface damage recorded by automated \
             pothole detection on the route from {} to {}. Each entry below gives the location \
             of a detected pothole, its estimated severity and the confidence of the detection.",
            details.source, details.destination
        ),
        11.0,
        &fonts.regular,
    );
    writer.gap(6.0);
}

fn write_summary(writer: &mut PageWriter<'_>, fonts: &Fonts, potholes: &[ReportEntry]) {
    let summary = ReportSummary::from_entries(potholes);

    writer.line("Summary", 13.0, &fonts.bold);
    writer.line(
        &format!("Total potholes recorded: {}", summary.total),
        11.0,
        &fonts.regular,
    );
    for severity in Severity::ALL.into_iter().rev() {
        writer.line(
            &format!("{} severity: {}", severity, summary.count(severity)),
            11.0,
            &fonts.regular,
        );
    }
    writer.gap(6.0);
}

fn write_table(writer: &mut PageWriter<'_>, fonts: &Fonts, potholes: &[ReportEntry]) {
    writer.line("Detected potholes", 13.0, &fonts.bold);

    if potholes.is_empty() {
        writer.line("No potholes have been recorded yet.", 11.0, &fonts.regular);
        writer.gap(6.0);
        return;
    }

    writer.line(
        &format!(
            "{:<5}{:>12}{:>13}  {:<9}{:>6}  {}",
            "#", "Latitude", "Longitude", "Severity", "Conf.", "Detected at (UTC)"
        ),
        9.0,
        &fonts.mono,
    );
    for (index, entry) in potholes.iter().enumerate() {
        writer.line(&table_row(index + 1, entry), 9.0, &fonts.mono);
    }
    writer.gap(6.0);
}

fn table_row(number: usize, entry: &ReportEntry) -> String {
    format!(
        "{:<5}{:>12.6}{:>13.6}  {:<9}{:>6.2}  {}",
        number,
        entry.lat,
        entry.lon,
        entry.severity.as_str(),
        entry.confidence,
        entry.time.format("%Y-%m-%d %H:%M:%S")
    )
}

fn write_closing(writer: &mut PageWriter<'_>, fonts: &Fonts) {
    writer.paragraph(
        "We request that the locations above be inspected and repaired at the earliest, \
         prioritising the high severity entries, to keep the road safe for all users.",
        11.0,
        &fonts.regular,
    );
    writer.gap(6.0);
    writer.line("Yours sincerely,", 11.0, &fonts.regular);
    writer.line("Concerned Citizen", 11.0, &fonts.regular);
}

/// Greedy word wrap on character count
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > columns {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
