// ABOUTME: Embedded Handlebars template for the HTML report
// ABOUTME: Self-contained page: styles, client-side search, metric toggle

/// The one and only report template. Everything is inlined so the file
/// can be mailed around or opened from disk without a server.
pub const REPORT_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>treeline report — run {{run_id}}</title>
<style>
  :root { --ok: #2e7d32; --warn: #e65100; --bad: #c62828; --line: #e0e0e0; }
  body { font: 14px/1.5 -apple-system, "Segoe UI", Roboto, sans-serif;
         margin: 0 auto; max-width: 1100px; padding: 1.5rem; color: #212121; }
  h1 { font-size: 1.4rem; } h2 { font-size: 1.1rem; margin-top: 2rem; }
  table { border-collapse: collapse; width: 100%; margin: .5rem 0; }
  th, td { text-align: left; padding: .3rem .6rem; border-bottom: 1px solid var(--line); }
  th { background: #fafafa; }
  tr.hidden { display: none; }
  .status-success { color: var(--ok); }
  .status-failed { color: var(--bad); }
  .status-skipped { color: #757575; }
  .meta { color: #616161; }
  .tree-box { overflow: auto; border: 1px solid var(--line); border-radius: 4px; padding: .5rem; }
  svg.tree .edge { stroke: #424242; stroke-width: 1.2; }
  svg.tree text.leaf { font: 12px monospace; cursor: pointer; }
  svg.tree text.leaf.hit { fill: var(--warn); font-weight: bold; }
  svg.tree .node.strong { fill: var(--ok); }
  svg.tree .node.moderate { fill: var(--warn); }
  svg.tree .node.weak { fill: var(--bad); }
  .legend span { margin-right: 1rem; }
  .dot { display: inline-block; width: .7em; height: .7em; border-radius: 50%; margin-right: .3em; }
  input[type=search] { padding: .35rem .6rem; border: 1px solid #bdbdbd; border-radius: 4px; width: 18rem; }
  button.metric { padding: .3rem .8rem; margin-left: .4rem; border: 1px solid #bdbdbd;
                  border-radius: 4px; background: #fff; cursor: pointer; }
  button.metric.active { background: #212121; color: #fff; }
</style>
</head>
<body>
<h1>Phylogenetic pipeline report</h1>
<p class="meta">
  run {{run_id}} &middot; seed {{seed}} &middot; generated {{generated}}<br>
  genes: {{genes}} &middot; aligner: {{msa_algo}} &middot; trimming: {{gblocks_preset}}
  &middot; bootstrap: {{bootstrap}} &middot; metric: {{metric}}
  {{#if msa_shape}}&middot; MSA {{msa_shape}}{{/if}}
</p>

<h2>Stages</h2>
<table>
  <thead><tr><th>Stage</th><th>Status</th><th>Duration</th><th>Result</th></tr></thead>
  <tbody>
    {{#each stages}}
    <tr>
      <td>{{name}}</td>
      <td class="status-{{status}}">{{status}}</td>
      <td>{{duration}}</td>
      <td>{{detail}}</td>
    </tr>
    {{/each}}
  </tbody>
</table>

<h2>Tree</h2>
<p>
  <input type="search" id="search" placeholder="highlight samples...">
  {{#if has_both_metrics}}
  <button class="metric active" data-metric="{{metric}}">{{metric}}</button>
  <button class="metric" data-metric="{{other_metric}}">{{other_metric}}</button>
  {{/if}}
</p>
<p class="legend">
  <span><span class="dot" style="background:var(--ok)"></span>support &ge; 90</span>
  <span><span class="dot" style="background:var(--warn)"></span>support &ge; 70</span>
  <span><span class="dot" style="background:var(--bad)"></span>support &lt; 70</span>
</p>
<div class="tree-box" id="tree-{{metric}}">{{{tree_svg}}}</div>
{{#if has_both_metrics}}
<div class="tree-box" id="tree-{{other_metric}}" style="display:none">{{{other_tree_svg}}}</div>
{{/if}}

<h2>Samples</h2>
<table id="samples">
  <thead>
    <tr><th>Sample</th><th>Genes</th><th>Length</th><th>Species annotation</th><th>Identity</th></tr>
  </thead>
  <tbody>
    {{#each samples}}
    <tr data-id="{{sample}}">
      <td>{{sample}}</td>
      <td>{{genes}}</td>
      <td>{{length}}</td>
      <td>{{species}}</td>
      <td>{{identity}}</td>
    </tr>
    {{/each}}
  </tbody>
</table>

{{#if missing}}
<h2>Missing samples</h2>
<table>
  <thead><tr><th>Gene</th><th>Missing</th></tr></thead>
  <tbody>
    {{#each missing}}
    <tr><td>{{gene}}</td><td>{{samples}}</td></tr>
    {{/each}}
  </tbody>
</table>
{{/if}}

{{#if bad_seqs}}
<h2>Rejected records</h2>
<table>
  <thead><tr><th>Sample</th><th>Gene</th><th>File</th><th>Reason</th></tr></thead>
  <tbody>
    {{#each bad_seqs}}
    <tr><td>{{sample}}</td><td>{{gene}}</td><td>{{file}}</td><td>{{reason}}</td></tr>
    {{/each}}
  </tbody>
</table>
{{/if}}

<script>
(function () {
  var search = document.getElementById('search');
  search.addEventListener('input', function () {
    var needle = search.value.toLowerCase();
    document.querySelectorAll('#samples tbody tr').forEach(function (row) {
      var id = (row.dataset.id || '').toLowerCase();
      row.classList.toggle('hidden', needle !== '' && id.indexOf(needle) === -1);
    });
    document.querySelectorAll('svg.tree text.leaf').forEach(function (leaf) {
      var id = (leaf.dataset.id || '').toLowerCase();
      leaf.classList.toggle('hit', needle !== '' && id.indexOf(needle) !== -1);
    });
  });

  document.querySelectorAll('button.metric').forEach(function (button) {
    button.addEventListener('click', function () {
      document.querySelectorAll('button.metric').forEach(function (other) {
        other.classList.toggle('active', other === button);
      });
      document.querySelectorAll('.tree-box').forEach(function (box) {
        box.style.display = box.id === 'tree-' + button.dataset.metric ? '' : 'none';
      });
    });
  });

  document.querySelectorAll('svg.tree text.leaf').forEach(function (leaf) {
    leaf.addEventListener('click', function () {
      search.value = leaf.dataset.id || '';
      search.dispatchEvent(new Event('input'));
    });
  });
})();
</script>
</body>
</html>
"##;
