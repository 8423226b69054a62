use std::path::Path;

use orchestrator_core::models::JobContext;

/// 命令与路径模板中可用的占位符取值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
    pub start_year: i32,
    pub end_year: i32,
    pub subtype: String,
    pub case: String,
    pub comparison: String,
    pub run_dir: String,
}

impl TemplateVars {
    pub fn new(ctx: &JobContext, case: &str, comparison: Option<&str>, run_dir: &Path) -> Self {
        Self {
            start_year: ctx.start_year,
            end_year: ctx.end_year,
            subtype: ctx.data_subtype().unwrap_or_default().to_string(),
            case: case.to_string(),
            comparison: comparison.unwrap_or_default().to_string(),
            run_dir: run_dir.display().to_string(),
        }
    }

    /// 替换占位符；年份统一补零到4位。`year` 为 None 时保留 `{year}`
    pub fn render(&self, template: &str, year: Option<i32>) -> String {
        let mut rendered = template
            .replace("{start}", &format!("{:04}", self.start_year))
            .replace("{end}", &format!("{:04}", self.end_year))
            .replace("{subtype}", &self.subtype)
            .replace("{case}", &self.case)
            .replace("{comparison}", &self.comparison)
            .replace("{run_dir}", &self.run_dir);
        if let Some(year) = year {
            rendered = rendered.replace("{year}", &format!("{year:04}"));
        }
        rendered
    }

    /// 含 `{year}` 的模板按窗口内每一年展开
    pub fn expand(&self, template: &str) -> Vec<String> {
        if template.contains("{year}") {
            (self.start_year..=self.end_year)
                .map(|year| self.render(template, Some(year)))
                .collect()
        } else {
            vec![self.render(template, None)]
        }
    }

    pub fn expand_all(&self, templates: &[String]) -> Vec<String> {
        templates.iter().flat_map(|t| self.expand(t)).collect()
    }
}
