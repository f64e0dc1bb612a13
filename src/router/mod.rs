//! Semantic router (C5).
//!
//! Classifies a query by nearest-exemplar lookup in embedding space: every
//! route is a named set of labelled example queries, embedded once at
//! construction, and `route(query)` returns the route whose best-matching
//! example is closest by cosine similarity (§4.5).

use crate::config::Config;
use crate::embedding::{Embedder, cosine_similarity};
use crate::error::{Result, RouterError};
use std::collections::HashMap;

/// A named route: a description (for prompting/diagnostics) and a set of
/// labelled example queries.
#[derive(Debug, Clone)]
pub struct Route {
    /// Route name, e.g. `"score_lookup"`.
    pub name: String,
    /// Human-readable description of what the route covers.
    pub description: String,
    /// Example queries representative of this intent.
    pub examples: Vec<String>,
    /// Optional canned response, used by FAQ-style routes.
    pub response_template: Option<String>,
}

impl Route {
    /// Builds a route with no canned response.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, examples: Vec<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            examples,
            response_template: None,
        }
    }
}

fn strs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// The closed set of default routes for the admissions chatbot, grounded in
/// the original router's `DEFAULT_ROUTES`.
#[must_use]
pub fn default_routes() -> Vec<Route> {
    vec![
        Route::new(
            "score_lookup",
            "Tra cứu điểm chuẩn, chỉ tiêu tuyển sinh",
            strs(&[
                "Điểm chuẩn Học viện Kỹ thuật Quân sự năm 2024",
                "Điểm chuẩn năm nay là bao nhiêu",
                "Với 25 điểm khối A có vào được không",
                "Trường nào điểm thấp nhất",
                "So sánh điểm chuẩn 2023 và 2024",
                "Chỉ tiêu tuyển sinh năm nay",
                "Điểm sàn các trường quân đội",
                "Học viện Quân y lấy bao nhiêu điểm",
                "Điểm chuẩn ngành công nghệ thông tin",
                "25 điểm vào được trường nào",
            ]),
        ),
        Route::new(
            "regulation",
            "Hỏi về quy định, tiêu chuẩn, điều kiện, thủ tục tuyển sinh",
            strs(&[
                "Tiêu chuẩn sức khỏe để thi vào quân đội",
                "Điều kiện đăng ký xét tuyển",
                "Yêu cầu về chính trị như thế nào",
                "Quy trình đăng ký xét tuyển",
                "Hồ sơ cần những gì",
                "Độ tuổi được đăng ký là bao nhiêu",
                "Chiều cao tối thiểu là bao nhiêu",
                "Có cần khám sức khỏe không",
                "Tiêu chuẩn về mắt như thế nào",
                "Quy định về đối tượng ưu tiên",
                "Thí sinh đã đăng ký sơ tuyển có phải đăng ký dự thi tốt nghiệp THPT không",
                "Quy trình sơ tuyển như thế nào",
                "Thủ tục nhập học ra sao",
                "Đối tượng nào được ưu tiên xét tuyển",
                "Khu vực tuyển sinh được quy định thế nào",
                "Thí sinh nữ có được đăng ký không",
                "Có cần xác nhận lý lịch không",
                "Điều kiện về học lực thế nào",
                "Quy định về cộng điểm ưu tiên",
                "Khám sức khỏe sơ tuyển gồm những gì",
                "Các trường quân đội sử dụng tổ hợp xét tuyển nào",
                "Tổ hợp môn thi vào trường quân đội",
                "Xét tuyển theo khối nào",
                "Nguyên tắc tuyển sinh quân sự",
            ]),
        ),
        Route::new(
            "faq",
            "Câu hỏi thường gặp về đời sống, chế độ, chính sách trong quân đội",
            strs(&[
                "Học quân đội có được miễn học phí không",
                "Ra trường được phân công ở đâu",
                "Có được về thăm nhà không",
                "Lương học viên là bao nhiêu",
                "Học bao lâu thì ra trường",
                "Có được dùng điện thoại không",
                "Ngành nào dễ xin việc nhất",
                "Nữ có được thi vào không",
                "Cận thị có được thi không",
                "Có hình xăm có được thi không",
            ]),
        ),
        Route::new(
            "greeting",
            "Chào hỏi, cảm ơn, tạm biệt",
            strs(&[
                "Xin chào", "Chào bạn", "Hello", "Hi", "Cảm ơn bạn", "Thanks", "Tạm biệt", "Bye",
                "Bạn là ai", "Bạn có thể giúp gì",
            ]),
        ),
        Route::new(
            "comparison",
            "So sánh các trường, ngành học",
            strs(&[
                "So sánh Học viện KTQS và Học viện Quân y",
                "Trường nào tốt nhất",
                "Ngành nào có tương lai",
                "Nên chọn trường nào",
                "So sánh điểm các trường",
                "Trường nào khó vào nhất",
            ]),
        ),
        Route::new(
            "school_info",
            "Giới thiệu, thông tin tổng quan về trường",
            strs(&[
                "Giới thiệu về Học viện Kỹ thuật Quân sự",
                "Học viện Hải quân có những ngành gì",
                "Thông tin về Trường Sĩ quan Lục quân",
                "Cho tôi biết về Học viện Quân y",
                "Trường Sĩ quan Chính trị đào tạo gì",
                "Học viện Biên phòng ở đâu",
                "Mô tả về Học viện Phòng không Không quân",
                "Trường Sĩ quan Công binh là trường gì",
                "Giới thiệu trường quân đội",
                "Học viện Hậu cần có gì đặc biệt",
            ]),
        ),
    ]
}

/// Per-route best-match score, keyed by route name.
pub type RouteScores = HashMap<String, f32>;

/// Result of routing a query.
#[derive(Debug, Clone)]
pub struct RouteResult {
    /// Best-matching route name, or `"unknown"` if nothing cleared the
    /// threshold (and the secondary best-of rule, if enabled, didn't apply).
    pub intent: String,
    /// The best-matching route's confidence score.
    pub confidence: f32,
    /// Every route's best score, for diagnostics and the Supervisor's
    /// best-of fallback.
    pub all_scores: RouteScores,
    /// True if `intent` cleared `router_similarity_threshold` outright.
    pub matched: bool,
}

/// Semantic router over a fixed set of routes, with every exemplar embedded
/// once at construction (§4.5: "cached embeddings live for the process
/// lifetime").
pub struct SemanticRouter {
    routes: Vec<Route>,
    exemplars: Vec<Vec<Vec<f32>>>,
    threshold: f32,
}

impl SemanticRouter {
    /// Builds a router, embedding every route's examples up front.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::NoRoutes`] if `routes` is empty, or
    /// [`RouterError::EmptyRoute`] if any route has no examples, or
    /// [`RouterError::EmbeddingFailed`] if embedding fails.
    pub fn build(routes: Vec<Route>, embedder: &dyn Embedder, config: &Config) -> Result<Self> {
        if routes.is_empty() {
            return Err(RouterError::NoRoutes.into());
        }
        let mut exemplars = Vec::with_capacity(routes.len());
        for route in &routes {
            if route.examples.is_empty() {
                return Err(RouterError::EmptyRoute { name: route.name.clone() }.into());
            }
            let mut vectors = Vec::with_capacity(route.examples.len());
            for example in &route.examples {
                let vector = embedder
                    .embed(example)
                    .map_err(|e| RouterError::EmbeddingFailed(e.to_string()))?;
                vectors.push(vector);
            }
            exemplars.push(vectors);
        }
        Ok(Self {
            routes,
            exemplars,
            threshold: config.router_similarity_threshold,
        })
    }

    /// Classifies `query`, embedding it and comparing against every route's
    /// cached exemplars (§4.5 steps 1–3).
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::EmbeddingFailed`] if the query cannot be embedded.
    pub fn route(&self, query: &str, embedder: &dyn Embedder) -> Result<RouteResult> {
        let query_vector = embedder
            .encode_query(query)
            .map_err(|e| RouterError::EmbeddingFailed(e.to_string()))?;

        let mut all_scores = RouteScores::new();
        let mut best_route = "unknown".to_string();
        let mut best_score = 0.0f32;

        for (route, vectors) in self.routes.iter().zip(&self.exemplars) {
            let max_sim = vectors
                .iter()
                .map(|v| cosine_similarity(&query_vector, v))
                .fold(f32::MIN, f32::max);
            all_scores.insert(route.name.clone(), max_sim);
            if max_sim > best_score {
                best_score = max_sim;
                best_route = route.name.clone();
            }
        }

        let matched = best_score >= self.threshold;
        tracing::debug!(intent = %best_route, confidence = best_score, matched, "routed query");

        Ok(RouteResult {
            intent: if matched { best_route } else { "unknown".to_string() },
            confidence: best_score,
            all_scores,
            matched,
        })
    }

    /// Looks up a route's canned response, if the route has one (used by the
    /// FAQ shortcut).
    #[must_use]
    pub fn response_template(&self, route_name: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|r| r.name == route_name)
            .and_then(|r| r.response_template.as_deref())
    }

    /// True if `score` falls in the "best-of" band `[0.75, threshold)`: not a
    /// hard match, but close enough that the Supervisor may still accept it
    /// when it has explicitly enabled best-of mode (§4.5 point 4).
    #[must_use]
    pub fn in_best_of_band(&self, score: f32) -> bool {
        (0.75..self.threshold).contains(&score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FallbackEmbedder;

    fn router() -> (SemanticRouter, FallbackEmbedder) {
        let embedder = FallbackEmbedder::new(32);
        let config = Config::default();
        let router = SemanticRouter::build(default_routes(), &embedder, &config).expect("build");
        (router, embedder)
    }

    #[test]
    fn build_rejects_empty_routes() {
        let embedder = FallbackEmbedder::new(8);
        let config = Config::default();
        let err = SemanticRouter::build(Vec::new(), &embedder, &config);
        assert!(matches!(err, Err(crate::error::Error::Router(RouterError::NoRoutes))));
    }

    #[test]
    fn build_rejects_route_with_no_examples() {
        let embedder = FallbackEmbedder::new(8);
        let config = Config::default();
        let routes = vec![Route::new("empty", "desc", Vec::new())];
        let err = SemanticRouter::build(routes, &embedder, &config);
        assert!(matches!(err, Err(crate::error::Error::Router(RouterError::EmptyRoute { .. }))));
    }

    #[test]
    fn routes_exact_exemplar_to_its_own_route_with_high_confidence() {
        let (router, embedder) = router();
        let result = router.route("Điểm chuẩn Học viện Kỹ thuật Quân sự năm 2024", &embedder).expect("route");
        assert_eq!(result.intent, "score_lookup");
        assert!(result.matched);
        assert!(result.confidence >= 0.85);
    }

    #[test]
    fn all_scores_has_one_entry_per_route() {
        let (router, embedder) = router();
        let result = router.route("Xin chào", &embedder).expect("route");
        assert_eq!(result.all_scores.len(), default_routes().len());
    }

    #[test]
    fn best_of_band_is_between_0_75_and_threshold() {
        let (router, _embedder) = router();
        assert!(router.in_best_of_band(0.8));
        assert!(!router.in_best_of_band(0.7));
        assert!(!router.in_best_of_band(0.9));
    }
}
