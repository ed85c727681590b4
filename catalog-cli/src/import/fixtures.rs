//! Workbook builders shared by the import tests

use rust_xlsxwriter::Workbook;

fn write_sheet(workbook: &mut Workbook, name: Option<&str>, rows: &[(i64, &str)]) {
    let worksheet = workbook.add_worksheet();
    if let Some(name) = name {
        worksheet.set_name(name).unwrap();
    }

    worksheet.write_string(0, 0, "Product ID").unwrap();
    worksheet.write_string(0, 1, "Status").unwrap();

    for (i, (product_id, status)) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        worksheet.write_number(row, 0, *product_id as f64).unwrap();
        worksheet.write_string(row, 1, *status).unwrap();
    }
}

/// Single-sheet workbook with a `Product ID` / `Status` heading row
pub fn stock_workbook(rows: &[(i64, &str)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    write_sheet(&mut workbook, None, rows);
    workbook.save_to_buffer().unwrap()
}

pub fn multi_sheet_workbook(sheets: &[(&str, &[(i64, &str)])]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        write_sheet(&mut workbook, Some(*name), rows);
    }
    workbook.save_to_buffer().unwrap()
}

/// Rows netting {4450:-1, 4768:-1, 4451:0, 4574:-1, 6039:+4}, plus rows the
/// reconciliation must ignore
pub fn reference_movements() -> Vec<(i64, &'static str)> {
    vec![
        (4450, "sold"),
        (4450, "SOLD"),
        (4450, " buy "),
        (4768, "sold"),
        (4768, "sold"),
        (4768, "buy"),
        (4451, "buy"),
        (4451, "buy"),
        (4451, "sold"),
        (4451, "sold"),
        (4574, "Sold"),
        (4574, "sold"),
        (4574, "Buy"),
        (6039, "buy"),
        (6039, "buy"),
        (6039, "buy"),
        (6039, "buy"),
        (6039, "returned"),
        (9999, "sold"),
        (0, "buy"),
    ]
}

/// A structurally valid xlsx package whose workbook declares no sheets.
///
/// Spreadsheet writers always add a sheet, so this one is assembled by hand
/// from stored (uncompressed) zip entries.
pub fn zero_sheet_workbook() -> Vec<u8> {
    let entries: [(&str, &str); 4] = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/></Types>"#,
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#,
        ),
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets/></workbook>"#,
        ),
    ];

    let mut out = Vec::new();
    let mut central = Vec::new();

    for (name, body) in entries {
        let offset = out.len() as u32;
        let crc = crc32(body.as_bytes());
        let size = body.len() as u32;

        // Local file header
        out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0x21u16.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(body.as_bytes());

        // Central directory record
        central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0x21u16.to_le_bytes());
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&size.to_le_bytes());
        central.extend_from_slice(&size.to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u32.to_le_bytes());
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name.as_bytes());
    }

    let central_offset = out.len() as u32;
    let central_size = central.len() as u32;
    out.extend_from_slice(&central);

    // End of central directory
    out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&central_size.to_le_bytes());
    out.extend_from_slice(&central_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());

    out
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

#[test]
fn test_crc32_known_value() {
    assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
}
